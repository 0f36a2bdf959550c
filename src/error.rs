//! Error types for the geocoding engine.

use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Remote-service faults are not represented here. The engine converts them
/// into "no result" outcomes (`None`, [`crate::geocoder::CandidateSearch::ServiceFailed`])
/// and logs them instead.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Invalid geocoder configuration: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Geocoding service rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Cancelling an in-flight reverse geocode is not supported by this geocoder")]
    CancellationNotSupported,
}

/// Errors reported by a [`crate::transport::GeocodeTransport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call failed or the service answered with a fault.
    #[error("Geocoding service fault: {0}")]
    Fault(String),

    /// The service refused the request because of missing or expired credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl TransportError {
    pub fn fault(message: impl Into<String>) -> Self {
        TransportError::Fault(message.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                TransportError::Unauthorized(err.to_string())
            }
            _ => TransportError::Fault(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Fault(format!("Malformed service response: {}", err))
    }
}

pub type Result<T, E = GeocodeError> = std::result::Result<T, E>;
