//! Geocoder for composite (multi-locator) services.

use std::sync::Arc;

use geo_types::Point;
use tracing::debug;

use super::engine::{filter_candidates, GeocoderCore};
use super::locators::LocatorTable;
use super::{CancellationSupport, CandidateSearch, Geocoder};
use crate::config::GeocoderConfig;
use crate::error::{GeocodeError, TransportError};
use crate::models::{Address, AddressCandidate, AddressField, AddressFormat, LocatorInfo};
use crate::transport::GeocodeTransport;

/// Pick the highest score, keeping the earlier candidate on ties.
pub(super) fn best_candidate(candidates: Vec<AddressCandidate>) -> Option<AddressCandidate> {
    candidates
        .into_iter()
        .reduce(|best, next| if next.score > best.score { next } else { best })
}

/// Geocoder backed by several sub-locators.
///
/// Every candidate names the locator that produced it; only candidates of
/// primary locators are accepted by [`Geocoder::geocode`]. The transport
/// offers no way to abort an in-flight call, so async cancellation is
/// reported as unsupported.
pub struct CompositeGeocoder {
    core: GeocoderCore,
}

impl CompositeGeocoder {
    pub fn new(config: &GeocoderConfig, transport: Arc<dyn GeocodeTransport>) -> Result<Self, GeocodeError> {
        config.validate()?;
        let locators = LocatorTable::from_config(&config.locators);
        Ok(Self {
            core: GeocoderCore::new(config, locators, transport),
        })
    }
}

impl Geocoder for CompositeGeocoder {
    fn address_fields(&self) -> Vec<AddressField> {
        self.core.fields().address_fields()
    }

    fn address_format(&self) -> AddressFormat {
        self.core.fields().format()
    }

    fn minimum_match_score(&self) -> u8 {
        self.core.service().minimum_match_score
    }

    fn minimum_candidate_score(&self) -> u8 {
        self.core.service().minimum_candidate_score
    }

    fn is_composite_locator(&self) -> bool {
        true
    }

    fn locators(&self) -> &[LocatorInfo] {
        self.core.locators().locators()
    }

    fn geocode(&self, address: &Address) -> Result<Option<AddressCandidate>, GeocodeError> {
        let Some(candidates) = self.core.find_candidates(address, Some(1))? else {
            return Ok(None);
        };

        match best_candidate(candidates) {
            Some(candidate) if candidate.locator.as_ref().map_or(true, |l| l.primary) => {
                Ok(Some(candidate))
            }
            Some(candidate) => {
                debug!(
                    "Best match '{}' came from non-primary locator '{}'",
                    candidate.full_address(),
                    candidate.address.match_method
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn batch_geocode(&self, addresses: &[Address]) -> Result<Vec<Option<AddressCandidate>>, GeocodeError> {
        self.core.batch_geocode(addresses)
    }

    fn geocode_candidates(
        &self,
        address: &Address,
        include_disabled_locators: bool,
    ) -> Result<CandidateSearch, GeocodeError> {
        match self.core.find_candidates(address, None)? {
            Some(raw) => Ok(CandidateSearch::Candidates(filter_candidates(
                &raw,
                self.minimum_candidate_score(),
                include_disabled_locators,
            ))),
            None => Ok(CandidateSearch::ServiceFailed),
        }
    }

    fn reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, GeocodeError> {
        self.core.reverse_geocode(location)
    }

    fn try_reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, TransportError> {
        self.core.try_reverse_geocode(location)
    }

    fn cancellation_support(&self) -> CancellationSupport {
        CancellationSupport::NotSupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeocoderKind;
    use crate::geocoder::test_support::config;
    use crate::models::{AddressPart, SublocatorType};
    use crate::transport::mock::{candidate, props, MockTransport};
    use crate::transport::ServiceMetadata;
    use serde_json::json;

    fn geocoder(transport: &Arc<MockTransport>) -> CompositeGeocoder {
        CompositeGeocoder::new(&config(GeocoderKind::Composite, true), transport.clone()).unwrap()
    }

    fn redlands() -> Address {
        Address::from_full_address("380 New York St, Redlands, CA")
    }

    #[test]
    fn test_metadata_exposed() {
        let transport = Arc::new(MockTransport::new());
        let geocoder = geocoder(&transport);

        assert!(geocoder.is_composite_locator());
        assert_eq!(geocoder.locators().len(), 3);
        assert_eq!(geocoder.minimum_match_score(), 80);
        assert_eq!(geocoder.address_format(), AddressFormat::SingleField);
        assert_eq!(geocoder.address_fields().len(), 1);
        assert_eq!(geocoder.cancellation_support(), CancellationSupport::NotSupported);
    }

    #[test]
    fn test_geocode_returns_primary_best() {
        let transport = Arc::new(MockTransport::new());
        transport.push_candidates(Ok(vec![
            candidate("380 NEW YORK ST", 85, "US_Streets", -117.19, 34.05),
            candidate("380 NEW YORK ST, REDLANDS", 97, "us_streets", -117.2, 34.06),
        ]));

        let best = geocoder(&transport).geocode(&redlands()).unwrap().unwrap();
        assert_eq!(best.score, 97);
        assert_eq!(best.full_address(), "380 NEW YORK ST, REDLANDS");
        assert_eq!(best.address.match_method, "US_Streets title");
        assert_eq!(best.locator.unwrap().kind, SublocatorType::Streets);

        let requests = transport.candidate_requests.lock().unwrap();
        assert_eq!(requests[0].max_locations, Some(1));
        assert_eq!(
            requests[0].attributes,
            vec![(
                "SingleLine".to_string(),
                "380 New York St, Redlands, CA".to_string()
            )]
        );
    }

    #[test]
    fn test_geocode_rejects_non_primary_best() {
        let transport = Arc::new(MockTransport::new());
        transport.push_candidates(Ok(vec![
            candidate("380 NEW YORK ST", 90, "US_Streets", -117.19, 34.05),
            candidate("380 NEW YORK ST", 100, "US_RoofTop", -117.19, 34.05),
        ]));

        assert_eq!(geocoder(&transport).geocode(&redlands()).unwrap(), None);
    }

    #[test]
    fn test_geocode_unknown_locator_fails_open() {
        let transport = Arc::new(MockTransport::new());
        transport.push_candidates(Ok(vec![candidate(
            "380 NEW YORK ST",
            92,
            "Custom_Parcels",
            -117.19,
            34.05,
        )]));

        let best = geocoder(&transport).geocode(&redlands()).unwrap().unwrap();
        assert!(best.locator.is_none());
        assert_eq!(best.address.match_method, "Custom_Parcels");
    }

    #[test]
    fn test_geocode_fault_is_no_result() {
        let transport = Arc::new(MockTransport::new());
        transport.push_candidates(Err(TransportError::fault("socket closed")));
        assert_eq!(geocoder(&transport).geocode(&redlands()).unwrap(), None);

        transport.push_candidates(Ok(Vec::new()));
        assert_eq!(geocoder(&transport).geocode(&redlands()).unwrap(), None);
    }

    #[test]
    fn test_geocode_unauthorized_propagates() {
        let transport = Arc::new(MockTransport::new());
        transport.push_candidates(Err(TransportError::Unauthorized("Invalid token.".into())));
        assert!(matches!(
            geocoder(&transport).geocode(&redlands()),
            Err(GeocodeError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_candidates_filtered_by_locator_and_score() {
        let transport = Arc::new(MockTransport::new());
        let rows = vec![
            candidate("A", 95, "US_Zip", 0.0, 0.0),
            candidate("B", 88, "US_RoofTop", 0.0, 0.0),
            candidate("C", 40, "US_Streets", 0.0, 0.0),
            candidate("D", 75, "US_Streets", 0.0, 0.0),
        ];
        transport.push_candidates(Ok(rows.clone()));
        transport.push_candidates(Ok(rows));
        let geocoder = geocoder(&transport);

        let search = geocoder.geocode_candidates(&redlands(), false).unwrap();
        let names: Vec<&str> = search
            .candidates()
            .unwrap()
            .iter()
            .map(|c| c.full_address())
            .collect();
        assert_eq!(names, vec!["B", "D"]);

        let search = geocoder.geocode_candidates(&redlands(), true).unwrap();
        let names: Vec<&str> = search
            .candidates()
            .unwrap()
            .iter()
            .map(|c| c.full_address())
            .collect();
        assert_eq!(names, vec!["A", "B", "D"]);
        assert_eq!(transport.candidate_requests.lock().unwrap()[0].max_locations, None);
    }

    #[test]
    fn test_candidates_failure_differs_from_empty() {
        let transport = Arc::new(MockTransport::new());
        transport.push_candidates(Err(TransportError::fault("timeout")));
        transport.push_candidates(Ok(vec![candidate("low", 10, "US_Streets", 0.0, 0.0)]));
        let geocoder = geocoder(&transport);

        assert_eq!(
            geocoder.geocode_candidates(&redlands(), false).unwrap(),
            CandidateSearch::ServiceFailed
        );
        assert_eq!(
            geocoder.geocode_candidates(&redlands(), false).unwrap(),
            CandidateSearch::Candidates(Vec::new())
        );
    }

    #[test]
    fn test_empty_address_is_argument_error() {
        let transport = Arc::new(MockTransport::new());
        let result = geocoder(&transport).geocode_candidates(&Address::new(), false);
        assert!(matches!(result, Err(GeocodeError::InvalidArgument(_))));
        assert!(transport.candidate_requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_batch_restores_request_order() {
        let transport = Arc::new(
            MockTransport::new()
                .with_metadata(ServiceMetadata {
                    suggested_batch_size: Some(10),
                    address_fields: vec!["Address".into(), "City".into()],
                    single_line_field: Some("SingleLine".into()),
                    result_fields: vec!["ResultID".into(), "Score".into()],
                })
                .with_batch_handler(|records| {
                    let label = |i: usize| records[i]["Address"].as_str().unwrap().to_string();
                    let mut rows = Vec::new();
                    for id in [2usize, 0, 1] {
                        let mut row = candidate(&label(id), 90, "US_Streets", 1.0, 2.0);
                        row.insert("ResultID".into(), json!(id));
                        rows.push(row);
                    }
                    Ok(rows)
                }),
        );

        let addresses: Vec<Address> = ["A St", "B St", "C St"]
            .iter()
            .map(|a| Address::from_full_address(a))
            .collect();

        let results = geocoder(&transport).batch_geocode(&addresses).unwrap();
        let matched: Vec<&str> = results
            .iter()
            .map(|c| c.as_ref().unwrap().full_address())
            .collect();
        assert_eq!(matched, vec!["A St", "B St", "C St"]);

        let requests = transport.batch_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][1]["OBJECTID"], json!(1));
    }

    #[test]
    fn test_batch_chunking() {
        let transport = Arc::new(
            MockTransport::new()
                .with_metadata(ServiceMetadata {
                    suggested_batch_size: Some(2),
                    address_fields: vec!["Address".into()],
                    single_line_field: None,
                    result_fields: Vec::new(),
                })
                .with_batch_handler(|records| {
                    Ok(records
                        .iter()
                        .map(|r| {
                            let text = r["Address"].as_str().unwrap();
                            candidate(text, 99, "US_Streets", 1.0, 1.0)
                        })
                        .collect())
                }),
        );

        let addresses: Vec<Address> = (1..=5)
            .map(|n| Address::from_full_address(&format!("{} Main St", n)))
            .collect();
        let geocoder = geocoder(&transport);

        let results = geocoder.batch_geocode(&addresses).unwrap();
        let matched: Vec<String> = results
            .iter()
            .map(|c| c.as_ref().unwrap().full_address().to_string())
            .collect();
        assert_eq!(
            matched,
            vec!["1 Main St", "2 Main St", "3 Main St", "4 Main St", "5 Main St"]
        );

        let requests = transport.batch_requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|chunk| chunk.len() <= 2));
        drop(requests);

        geocoder.batch_geocode(&addresses[..1]).unwrap();
        assert_eq!(*transport.metadata_calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_batch_single_line_field_fallback() {
        let transport = Arc::new(
            MockTransport::new()
                .with_metadata(ServiceMetadata {
                    single_line_field: Some("SingleLineInput".into()),
                    ..ServiceMetadata::default()
                })
                .with_batch_handler(|records| {
                    Ok(records
                        .iter()
                        .map(|r| candidate(r["SingleLineInput"].as_str().unwrap(), 90, "US_Streets", 1.0, 1.0))
                        .collect())
                }),
        );

        let results = geocoder(&transport)
            .batch_geocode(&[Address::from_full_address("1 Main St")])
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().full_address(), "1 Main St");

        let requests = transport.batch_requests.lock().unwrap();
        assert!(requests[0][0].contains_key("SingleLineInput"));
    }

    #[test]
    fn test_batch_failed_chunk_degrades() {
        let transport = Arc::new(
            MockTransport::new()
                .with_metadata(ServiceMetadata {
                    suggested_batch_size: Some(2),
                    address_fields: vec!["SingleLine".into()],
                    ..ServiceMetadata::default()
                })
                .with_batch_handler(|records| {
                    if records[0]["SingleLine"] == json!("bad") {
                        return Err(TransportError::fault("chunk rejected"));
                    }
                    Ok(records
                        .iter()
                        .map(|r| candidate(r["SingleLine"].as_str().unwrap(), 90, "US_Streets", 1.0, 1.0))
                        .collect())
                }),
        );

        let addresses = vec![
            Address::from_full_address("bad"),
            Address::from_full_address("worse"),
            Address::new(),
            Address::from_full_address("good"),
        ];

        let results = geocoder(&transport).batch_geocode(&addresses).unwrap();
        assert!(results[0].is_none());
        assert!(results[1].is_none());
        assert!(results[2].is_none());
        assert_eq!(results[3].as_ref().unwrap().full_address(), "good");
        assert_eq!(transport.batch_requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_reverse_geocode() {
        let transport = Arc::new(MockTransport::new().with_reverse_handler(|request| {
            assert_eq!(request.search_distance, 500.0);
            Ok(props(&[
                ("Address", json!("380 New York St")),
                ("City", json!("Redlands")),
                ("Match_addr", json!("380 New York St,  Redlands")),
                ("Loc_name", json!("US_Streets")),
            ]))
        }));

        let address = geocoder(&transport)
            .reverse_geocode(Point::new(-117.19, 34.05))
            .unwrap()
            .unwrap();
        assert_eq!(address.get(AddressPart::AddressLine), "380 New York St");
        assert_eq!(address.get(AddressPart::FullAddress), "380 New York St, Redlands");
        assert_eq!(address.match_method, "US_Streets");
    }

    #[test]
    fn test_reverse_geocode_empty_is_none() {
        let transport = Arc::new(MockTransport::new());
        let geocoder = geocoder(&transport);
        assert_eq!(geocoder.reverse_geocode(Point::new(1.0, 2.0)).unwrap(), None);
        assert!(matches!(
            geocoder.reverse_geocode(Point::new(f64::NAN, 2.0)),
            Err(GeocodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_configuration() {
        let mut cfg = config(GeocoderKind::Composite, true);
        cfg.locators.clear();
        let result = CompositeGeocoder::new(&cfg, Arc::new(MockTransport::new()));
        assert!(matches!(result, Err(GeocodeError::Configuration(_))));
    }
}
