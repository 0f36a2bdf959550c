//! In-memory transport used by the engine tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::json;

use super::{
    GeocodeRequest, GeocodeTransport, PropertySet, RecordSet, ReverseGeocodeRequest,
    ServiceMetadata,
};
use crate::error::TransportError;

type BatchHandler = Box<dyn Fn(&RecordSet) -> Result<RecordSet, TransportError> + Send + Sync>;
type ReverseHandler =
    Box<dyn Fn(&ReverseGeocodeRequest) -> Result<PropertySet, TransportError> + Send + Sync>;

/// Scripted transport that records every request it receives.
#[derive(Default)]
pub struct MockTransport {
    pub candidates: Mutex<VecDeque<Result<Vec<PropertySet>, TransportError>>>,
    pub metadata: Mutex<Option<ServiceMetadata>>,
    pub batch_handler: Option<BatchHandler>,
    pub reverse_handler: Option<ReverseHandler>,

    pub candidate_requests: Mutex<Vec<GeocodeRequest>>,
    pub batch_requests: Mutex<Vec<RecordSet>>,
    pub reverse_requests: Mutex<Vec<ReverseGeocodeRequest>>,
    pub metadata_calls: Mutex<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response of the next `find_candidates` call.
    pub fn push_candidates(&self, response: Result<Vec<PropertySet>, TransportError>) {
        self.candidates.lock().unwrap().push_back(response);
    }

    pub fn with_metadata(self, metadata: ServiceMetadata) -> Self {
        *self.metadata.lock().unwrap() = Some(metadata);
        self
    }

    pub fn with_batch_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RecordSet) -> Result<RecordSet, TransportError> + Send + Sync + 'static,
    {
        self.batch_handler = Some(Box::new(handler));
        self
    }

    pub fn with_reverse_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ReverseGeocodeRequest) -> Result<PropertySet, TransportError> + Send + Sync + 'static,
    {
        self.reverse_handler = Some(Box::new(handler));
        self
    }
}

/// Build a property set from `(key, value)` pairs.
pub fn props(pairs: &[(&str, serde_json::Value)]) -> PropertySet {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// A response record with the default response field names.
pub fn candidate(match_addr: &str, score: u8, locator: &str, x: f64, y: f64) -> PropertySet {
    props(&[
        ("Match_addr", json!(match_addr)),
        ("Score", json!(score)),
        ("Loc_name", json!(locator)),
        ("Shape", json!({ "x": x, "y": y })),
    ])
}

impl GeocodeTransport for MockTransport {
    fn find_candidates(&self, request: &GeocodeRequest) -> Result<Vec<PropertySet>, TransportError> {
        self.candidate_requests.lock().unwrap().push(request.clone());
        self.candidates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn geocode_batch(&self, records: &RecordSet) -> Result<RecordSet, TransportError> {
        self.batch_requests.lock().unwrap().push(records.clone());
        match &self.batch_handler {
            Some(handler) => handler(records),
            None => Ok(Vec::new()),
        }
    }

    fn reverse_geocode(&self, request: &ReverseGeocodeRequest) -> Result<PropertySet, TransportError> {
        self.reverse_requests.lock().unwrap().push(*request);
        match &self.reverse_handler {
            Some(handler) => handler(request),
            None => Ok(PropertySet::new()),
        }
    }

    fn metadata(&self) -> Result<ServiceMetadata, TransportError> {
        *self.metadata_calls.lock().unwrap() += 1;
        self.metadata
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::fault("no metadata scripted"))
    }
}
