//! Geocoder for single-field world geocoding services.

use std::sync::Arc;

use geo_types::Point;
use tracing::warn;

use super::composite::best_candidate;
use super::engine::{filter_candidates, GeocoderCore};
use super::locators::LocatorTable;
use super::{CancellationSupport, CandidateSearch, Geocoder};
use crate::config::GeocoderConfig;
use crate::error::{GeocodeError, TransportError};
use crate::models::{Address, AddressCandidate, AddressField, AddressFormat, AddressPart, LocatorInfo};
use crate::transport::GeocodeTransport;

/// Geocoder for a service with one implicit locator.
///
/// Candidates carry no locator; [`LocatorInfo::default_locator`] applies to
/// all of them, so every candidate is usable and `geocode` always returns
/// the best one. Async reverse geocodes cannot be aborted on the wire but
/// are cancelled by discarding their result.
pub struct WorldGeocoder {
    core: GeocoderCore,
}

impl WorldGeocoder {
    pub fn new(config: &GeocoderConfig, transport: Arc<dyn GeocodeTransport>) -> Result<Self, GeocodeError> {
        config.validate()?;
        if config.field_name(AddressPart::FullAddress).is_none() {
            return Err(GeocodeError::Configuration(
                "world geocoder needs a full_address field mapping".to_string(),
            ));
        }
        if !config.locators.is_empty() {
            warn!(
                "Ignoring {} locator definitions for non-composite geocoder",
                config.locators.len()
            );
        }

        Ok(Self {
            core: GeocoderCore::new(config, LocatorTable::default(), transport),
        })
    }
}

impl Geocoder for WorldGeocoder {
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
        false
    }

    fn locators(&self) -> &[LocatorInfo] {
        &[]
    }

    fn geocode(&self, address: &Address) -> Result<Option<AddressCandidate>, GeocodeError> {
        Ok(self
            .core
            .find_candidates(address, Some(1))?
            .and_then(best_candidate))
    }

    fn batch_geocode(&self, addresses: &[Address]) -> Result<Vec<Option<AddressCandidate>>, GeocodeError> {
        self.core.batch_geocode(addresses)
    }

    fn geocode_candidates(
        &self,
        address: &Address,
        include_disabled_locators: bool,
    ) -> Result<CandidateSearch, GeocodeError> {
        Ok(match self.core.find_candidates(address, None)? {
            Some(raw) => CandidateSearch::Candidates(filter_candidates(
                &raw,
                self.minimum_candidate_score(),
                include_disabled_locators,
            )),
            None => CandidateSearch::ServiceFailed,
        })
    }

    fn reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, GeocodeError> {
        self.core.reverse_geocode(location)
    }

    fn try_reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, TransportError> {
        self.core.try_reverse_geocode(location)
    }

    fn cancellation_support(&self) -> CancellationSupport {
        CancellationSupport::Filtered
    }
}
