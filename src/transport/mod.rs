//! Request/response contract with the remote geocoding service.
//!
//! The engine never talks HTTP itself; it hands typed requests to a
//! [`GeocodeTransport`] and parses the flat property sets it gets back.

mod rest;

#[cfg(test)]
pub(crate) mod mock;

pub use rest::RestTransport;

use geo_types::Point;
use serde::{Deserialize, Serialize};

use crate::config::DistanceUnit;
use crate::error::TransportError;

/// Flat key-value response record.
pub type PropertySet = serde_json::Map<String, serde_json::Value>;

/// Rows of a batch request or response.
pub type RecordSet = Vec<PropertySet>;

/// Single address (candidate list) request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeocodeRequest {
    /// Service field name → value
    pub attributes: Vec<(String, String)>,
    /// Upper bound on the candidates returned, `None` for the service default
    pub max_locations: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReverseGeocodeRequest {
    pub location: Point<f64>,
    pub search_distance: f64,
    pub distance_unit: DistanceUnit,
}

/// Service description queried once per geocoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    /// Largest batch the service wants per request
    pub suggested_batch_size: Option<usize>,
    /// Input field names the service accepts, in service order
    pub address_fields: Vec<String>,
    pub single_line_field: Option<String>,
    /// Field names present on batch result rows
    pub result_fields: Vec<String>,
}

/// Transport collaborator of the engine.
///
/// Implementations block the calling thread; timeouts and retries are their
/// concern.
pub trait GeocodeTransport: Send + Sync {
    fn find_candidates(&self, request: &GeocodeRequest) -> Result<Vec<PropertySet>, TransportError>;

    fn geocode_batch(&self, records: &RecordSet) -> Result<RecordSet, TransportError>;

    /// Returns an empty property set when nothing was found near the point.
    fn reverse_geocode(&self, request: &ReverseGeocodeRequest) -> Result<PropertySet, TransportError>;

    fn metadata(&self) -> Result<ServiceMetadata, TransportError>;
}
