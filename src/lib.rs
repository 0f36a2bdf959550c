//! Locus - address geocoding against remote geocoding services
//!
//! This library provides the geocoder engine, the location validator and the
//! async reverse-geocode gateway used by the `locus` binary.

pub mod config;
pub mod error;
pub mod gateway;
pub mod geocoder;
pub mod models;
pub mod transport;
pub mod validator;

pub use config::GeocoderConfig;
pub use error::{GeocodeError, TransportError};
pub use gateway::{RequestState, RequestToken, ReverseGeocodeCompleted, ReverseGeocodeGateway};
pub use geocoder::{build_geocoder, CandidateSearch, Geocoder};
pub use models::{Address, AddressCandidate, AddressPart, LocatorInfo};
pub use validator::LocationValidator;
