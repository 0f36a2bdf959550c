//! Geocoder abstraction and its concrete variants.
//!
//! Both variants share [`engine::GeocoderCore`] for request building and
//! response parsing; they differ in locator handling, in how `geocode`
//! gates the best candidate and in their cancellation contract.

mod batch;
mod composite;
mod engine;
mod fields;
mod locators;
mod world;

pub use composite::CompositeGeocoder;
pub use engine::{check_point, filter_candidates};
pub use fields::clean_text;
pub use locators::LocatorTable;
pub use world::WorldGeocoder;

use std::sync::Arc;

use geo_types::Point;
use tracing::info;

use crate::config::{GeocoderConfig, GeocoderKind};
use crate::error::{GeocodeError, TransportError};
use crate::models::{Address, AddressCandidate, AddressField, AddressFormat, LocatorInfo};
use crate::transport::GeocodeTransport;

/// Outcome of [`Geocoder::geocode_candidates`].
///
/// A failed service call and a successful call that left nothing after
/// filtering are different answers and are kept apart.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSearch {
    /// The service answered; candidates that passed filtering, best first
    Candidates(Vec<AddressCandidate>),
    /// The service call failed (already logged)
    ServiceFailed,
}

impl CandidateSearch {
    pub fn candidates(&self) -> Option<&[AddressCandidate]> {
        match self {
            CandidateSearch::Candidates(candidates) => Some(candidates),
            CandidateSearch::ServiceFailed => None,
        }
    }
}

/// How a geocoder handles cancellation of an outstanding async reverse geocode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationSupport {
    /// Cancelling fails with [`GeocodeError::CancellationNotSupported`]
    NotSupported,
    /// The request runs to completion and its result is discarded
    Filtered,
}

/// Address ↔ location resolution against a remote geocoding service.
///
/// All operations block the calling thread on network I/O. Transport faults
/// never surface as errors; see the individual operations for the
/// "no result" shape each one uses.
pub trait Geocoder: Send + Sync {
    /// Fields relevant to the detected address format.
    fn address_fields(&self) -> Vec<AddressField>;

    fn address_format(&self) -> AddressFormat;

    /// Score at or above which a match counts as confident. Not enforced by
    /// [`Geocoder::geocode`].
    fn minimum_match_score(&self) -> u8;

    /// Score below which [`Geocoder::geocode_candidates`] drops candidates.
    fn minimum_candidate_score(&self) -> u8;

    fn is_composite_locator(&self) -> bool;

    /// Sub-locators of a composite service, empty otherwise.
    fn locators(&self) -> &[LocatorInfo];

    /// Best candidate for `address`, or `None` when nothing matched, when the
    /// best match came from a non-primary locator, or when the call failed.
    fn geocode(&self, address: &Address) -> Result<Option<AddressCandidate>, GeocodeError>;

    /// One result slot per input address, in input order.
    fn batch_geocode(&self, addresses: &[Address]) -> Result<Vec<Option<AddressCandidate>>, GeocodeError>;

    fn geocode_candidates(
        &self,
        address: &Address,
        include_disabled_locators: bool,
    ) -> Result<CandidateSearch, GeocodeError>;

    /// Address near `location`, `None` when nothing was found or the call failed.
    fn reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, GeocodeError>;

    /// Like [`Geocoder::reverse_geocode`] but reports transport faults
    /// instead of absorbing them. The point must be finite.
    fn try_reverse_geocode(&self, location: Point<f64>) -> Result<Option<Address>, TransportError>;

    fn cancellation_support(&self) -> CancellationSupport;
}

/// Build the geocoder variant selected by `config.service.kind`.
pub fn build_geocoder(
    config: &GeocoderConfig,
    transport: Arc<dyn GeocodeTransport>,
) -> Result<Arc<dyn Geocoder>, GeocodeError> {
    info!(
        "Creating {:?} geocoder for {}",
        config.service.kind, config.service.url
    );
    match config.service.kind {
        GeocoderKind::Composite => Ok(Arc::new(CompositeGeocoder::new(config, transport)?)),
        GeocoderKind::World => Ok(Arc::new(WorldGeocoder::new(config, transport)?)),
    }
}
