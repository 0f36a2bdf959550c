//! Request/response handling shared by the geocoder variants.

use std::sync::Arc;

use geo_types::Point;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::batch::{correlate, request_row};
use super::fields::{clean_text, lookup, value_text, FieldMap};
use super::locators::LocatorTable;
use crate::config::{GeocoderConfig, ResponseFields, ServiceConfig};
use crate::error::{GeocodeError, TransportError};
use crate::models::{Address, AddressCandidate, AddressPart};
use crate::transport::{
    GeocodeRequest, GeocodeTransport, PropertySet, RecordSet, ReverseGeocodeRequest, ServiceMetadata,
};

/// Drop candidates of disabled locators (unless asked to keep them) and
/// candidates scoring below `minimum_score`, best first.
///
/// Pure: the same input and thresholds always give the same output.
pub fn filter_candidates(
    candidates: &[AddressCandidate],
    minimum_score: u8,
    include_disabled_locators: bool,
) -> Vec<AddressCandidate> {
    let mut kept: Vec<AddressCandidate> = candidates
        .iter()
        .filter(|c| include_disabled_locators || c.is_usable())
        .filter(|c| c.score >= minimum_score)
        .cloned()
        .collect();
    kept.sort_by(|a, b| b.score.cmp(&a.score));
    kept
}

fn parse_score(value: Option<&Value>) -> u8 {
    let score = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    score.map_or(0, |s| s.round().clamp(0.0, 100.0) as u8)
}

fn parse_point(value: Option<&Value>) -> Option<Point<f64>> {
    let value = value?;
    let x = value["x"].as_f64()?;
    let y = value["y"].as_f64()?;
    (x.is_finite() && y.is_finite()).then(|| Point::new(x, y))
}

/// Convert a transport fault into a logged "no result"; credentials
/// problems stay errors.
fn absorb_fault<T>(operation: &str, result: Result<T, TransportError>) -> Result<Option<T>, GeocodeError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(TransportError::Unauthorized(message)) => Err(GeocodeError::Unauthorized(message)),
        Err(TransportError::Fault(message)) => {
            warn!("{} failed: {}", operation, message);
            Ok(None)
        }
    }
}

/// Engine state common to every geocoder variant.
pub struct GeocoderCore {
    service: ServiceConfig,
    response: ResponseFields,
    fields: FieldMap,
    locators: LocatorTable,
    transport: Arc<dyn GeocodeTransport>,
    /// Queried on first batch use, shared afterwards
    metadata: OnceCell<ServiceMetadata>,
}

impl GeocoderCore {
    pub fn new(config: &GeocoderConfig, locators: LocatorTable, transport: Arc<dyn GeocodeTransport>) -> Self {
        Self {
            service: config.service.clone(),
            response: config.response.clone(),
            fields: FieldMap::new(config.fields.clone(), config.service.single_line_input),
            locators,
            transport,
            metadata: OnceCell::new(),
        }
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn locators(&self) -> &LocatorTable {
        &self.locators
    }

    fn metadata(&self) -> Result<&ServiceMetadata, TransportError> {
        self.metadata.get_or_try_init(|| {
            let metadata = self.transport.metadata()?;
            info!(
                "Geocoding service metadata: batch size {:?}, {} address fields",
                metadata.suggested_batch_size,
                metadata.address_fields.len()
            );
            Ok(metadata)
        })
    }

    /// Map one response record to a candidate with its locator resolved.
    pub fn parse_candidate(&self, props: &PropertySet) -> AddressCandidate {
        let mut address = self.fields.parse_address(props);

        if let Some(text) = lookup(props, &self.response.match_address).and_then(value_text) {
            address.set(AddressPart::FullAddress, clean_text(&text));
        }
        address.match_method = lookup(props, &self.response.locator_name)
            .and_then(value_text)
            .unwrap_or_default();

        let mut candidate = AddressCandidate {
            address,
            location: parse_point(lookup(props, &self.response.shape)),
            score: parse_score(lookup(props, &self.response.score)),
            locator: None,
            address_type: lookup(props, &self.response.address_type)
                .and_then(value_text)
                .unwrap_or_default(),
        };
        self.locators.apply(&mut candidate);
        candidate
    }

    /// Send a candidate request; `Ok(None)` means the service call failed.
    pub fn find_candidates(
        &self,
        address: &Address,
        max_locations: Option<usize>,
    ) -> Result<Option<Vec<AddressCandidate>>, GeocodeError> {
        let request = GeocodeRequest {
            attributes: self.fields.request_attributes(address)?,
            max_locations,
        };

        let rows = absorb_fault("Geocode request", self.transport.find_candidates(&request))?;
        Ok(rows.map(|rows| {
            debug!("Service returned {} candidates", rows.len());
            rows.iter().map(|row| self.parse_candidate(row)).collect()
        }))
    }

    /// Geocode many addresses in chunks, one result slot per address.
    pub fn batch_geocode(&self, addresses: &[Address]) -> Result<Vec<Option<AddressCandidate>>, GeocodeError> {
        let mut results: Vec<Option<AddressCandidate>> = vec![None; addresses.len()];
        if addresses.is_empty() {
            return Ok(results);
        }

        let Some(metadata) = absorb_fault("Service metadata query", self.metadata())? else {
            return Ok(results);
        };

        let chunk_size = metadata
            .suggested_batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.service.default_batch_size);

        let single_field_name = metadata
            .address_fields
            .first()
            .or(metadata.single_line_field.as_ref())
            .map(String::as_str)
            .or_else(|| self.fields.name_of(AddressPart::FullAddress))
            .unwrap_or_default();

        let correlation_field = metadata
            .result_fields
            .iter()
            .any(|f| f.eq_ignore_ascii_case(&self.service.correlation_field))
            .then_some(self.service.correlation_field.as_str());

        let rows: Vec<(usize, Vec<(String, String)>)> = addresses
            .iter()
            .enumerate()
            .filter_map(|(i, address)| {
                let attributes = self.fields.batch_attributes(address, single_field_name);
                if attributes.is_none() {
                    debug!("Skipping empty address at index {}", i);
                }
                attributes.map(|a| (i, a))
            })
            .collect();

        let chunk_count = rows.len().div_ceil(chunk_size);
        info!(
            "Batch geocoding {} addresses in {} chunks of up to {}",
            rows.len(),
            chunk_count,
            chunk_size
        );

        for (chunk_no, chunk) in rows.chunks(chunk_size).enumerate() {
            let records: RecordSet = chunk
                .iter()
                .enumerate()
                .map(|(id, (_, attributes))| {
                    request_row(&self.service.object_id_field, id, attributes.clone())
                })
                .collect();

            let operation = format!("Batch chunk {}/{}", chunk_no + 1, chunk_count);
            let Some(response) = absorb_fault(&operation, self.transport.geocode_batch(&records))? else {
                continue;
            };

            for ((input_index, _), row) in chunk.iter().zip(correlate(response, chunk.len(), correlation_field)) {
                let Some(row) = row else { continue };
                let candidate = self.parse_candidate(&row);
                if candidate.location.is_some() && candidate.is_usable() {
                    results[*input_index] = Some(candidate);
                }
            }
        }

        Ok(results)
    }

    /// Reverse geocode a point; `None` when nothing was found or the call failed.
    pub fn reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, GeocodeError> {
        check_point(location)?;
        Ok(absorb_fault("Reverse geocode", self.try_reverse_geocode(location))?.flatten())
    }

    /// Reverse geocode without absorbing transport faults.
    pub fn try_reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, TransportError> {
        let request = ReverseGeocodeRequest {
            location,
            search_distance: self.service.reverse_search_distance,
            distance_unit: self.service.distance_unit,
        };

        let props = self.transport.reverse_geocode(&request)?;
        if props.is_empty() {
            return Ok(None);
        }

        let mut address = self.fields.parse_address(&props);
        if address.get(AddressPart::FullAddress).is_empty() {
            if let Some(text) = lookup(&props, &self.response.match_address).and_then(value_text) {
                address.set(AddressPart::FullAddress, clean_text(&text));
            }
        }
        if let Some(method) = lookup(&props, &self.response.locator_name).and_then(value_text) {
            address.match_method = method;
        }

        Ok((!address.is_empty()).then_some(address))
    }
}

/// Reject points the service cannot interpret.
pub fn check_point(location: Point<f64>) -> Result<(), GeocodeError> {
    if location.x().is_finite() && location.y().is_finite() {
        Ok(())
    } else {
        Err(GeocodeError::InvalidArgument(format!(
            "location ({}, {}) is not a finite point",
            location.x(),
            location.y()
        )))
    }
}
