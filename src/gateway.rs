//! Asynchronous reverse geocoding on top of a blocking [`Geocoder`].
//!
//! Requests run on the tokio blocking pool and report back through an
//! unbounded channel. Each request is identified by a caller-chosen
//! [`RequestToken`].

use std::sync::{Arc, Mutex, MutexGuard};

use geo_types::Point;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::GeocodeError;
use crate::geocoder::{check_point, CancellationSupport, Geocoder};
use crate::models::Address;

/// Caller-side identity of an async request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken(pub Uuid);

impl RequestToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Completed,
    Canceled,
    Faulted,
}

/// Completion event of a request that was neither cancelled nor faulted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseGeocodeCompleted {
    /// `None` when nothing was found near the location
    pub address: Option<Address>,
    pub location: Point<f64>,
    pub token: RequestToken,
}

/// State of one token plus the generation of the task that owns it.
///
/// A token may be reused once its request is cancelled; the task of the
/// earlier request then no longer owns the entry and must not touch it.
#[derive(Debug, Clone, Copy)]
struct Request {
    state: RequestState,
    generation: u64,
}

#[derive(Debug, Default)]
struct Requests {
    entries: HashMap<RequestToken, Request>,
    next_generation: u64,
}

type StateTable = Arc<Mutex<Requests>>;

fn lock(states: &StateTable) -> MutexGuard<'_, Requests> {
    states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ReverseGeocodeGateway {
    geocoder: Arc<dyn Geocoder>,
    runtime: Handle,
    states: StateTable,
    events: UnboundedSender<ReverseGeocodeCompleted>,
}

impl ReverseGeocodeGateway {
    /// Create a gateway and the receiver its completion events go to.
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        runtime: Handle,
    ) -> (Self, UnboundedReceiver<ReverseGeocodeCompleted>) {
        let (events, receiver) = unbounded_channel();
        let gateway = Self {
            geocoder,
            runtime,
            states: Arc::new(Mutex::new(Requests::default())),
            events,
        };
        (gateway, receiver)
    }

    /// Start a reverse geocode and return immediately.
    ///
    /// Fails without doing any I/O when `location` is not finite or `token`
    /// already names a pending request. The token of a cancelled request
    /// may be reused right away.
    pub fn reverse_geocode_async(&self, location: Point<f64>, token: RequestToken) -> Result<(), GeocodeError> {
        check_point(location)?;
        let generation = {
            let mut requests = lock(&self.states);
            if requests.entries.get(&token).map(|r| r.state) == Some(RequestState::Pending) {
                return Err(GeocodeError::InvalidArgument(format!(
                    "request {} is already pending",
                    token
                )));
            }
            let generation = requests.next_generation;
            requests.next_generation += 1;
            requests.entries.insert(
                token,
                Request {
                    state: RequestState::Pending,
                    generation,
                },
            );
            generation
        };

        let geocoder = Arc::clone(&self.geocoder);
        let states = Arc::clone(&self.states);
        let events = self.events.clone();
        self.runtime.spawn_blocking(move || {
            let result = geocoder.try_reverse_geocode(location);

            let mut requests = lock(&states);
            let Some(request) = requests
                .entries
                .get_mut(&token)
                .filter(|r| r.generation == generation)
            else {
                debug!("Discarding result of superseded request {}", token);
                return;
            };
            if request.state == RequestState::Canceled {
                debug!("Discarding result of cancelled request {}", token);
                return;
            }
            match result {
                Ok(address) => {
                    // sent under the lock so a Completed state implies a queued event
                    request.state = RequestState::Completed;
                    let event = ReverseGeocodeCompleted {
                        address,
                        location,
                        token,
                    };
                    if events.send(event).is_err() {
                        warn!("Completion of request {} dropped, receiver is gone", token);
                    }
                }
                Err(e) => {
                    request.state = RequestState::Faulted;
                    error!("Reverse geocode request {} failed: {}", token, e);
                }
            }
        });
        Ok(())
    }

    /// Cancel a pending request.
    ///
    /// Unknown and already finished tokens are ignored.
    pub fn cancel_reverse_geocode(&self, token: RequestToken) -> Result<(), GeocodeError> {
        match self.geocoder.cancellation_support() {
            CancellationSupport::NotSupported => Err(GeocodeError::CancellationNotSupported),
            CancellationSupport::Filtered => {
                let mut requests = lock(&self.states);
                if let Some(request) = requests.entries.get_mut(&token) {
                    if request.state == RequestState::Pending {
                        request.state = RequestState::Canceled;
                        debug!("Request {} cancelled", token);
                    }
                }
                Ok(())
            }
        }
    }

    pub fn state(&self, token: RequestToken) -> Option<RequestState> {
        lock(&self.states).entries.get(&token).map(|r| r.state)
    }

    /// Forget every request that is no longer pending.
    ///
    /// Tasks of cleared cancelled requests still run to completion; their
    /// results are discarded.
    pub fn clear_finished(&self) {
        lock(&self.states)
            .entries
            .retain(|_, request| request.state == RequestState::Pending);
    }
}
