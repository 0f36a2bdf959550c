//! Sub-locator descriptors.

use serde::{Deserialize, Serialize};

use super::AddressPart;

/// Geography a sub-locator is specialised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SublocatorType {
    /// Exact rooftop / parcel points
    AddressPoint,
    /// Interpolated positions along street segments
    Streets,
    Zip,
    CityState,
}

impl std::fmt::Display for SublocatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SublocatorType::AddressPoint => write!(f, "address_point"),
            SublocatorType::Streets => write!(f, "streets"),
            SublocatorType::Zip => write!(f, "zip"),
            SublocatorType::CityState => write!(f, "city_state"),
        }
    }
}

/// Immutable description of one sub-geocoder of a composite service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorInfo {
    /// Name the service reports as the match method
    pub name: String,
    /// Human readable title
    pub title: String,
    pub primary: bool,
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: SublocatorType,
    /// Address parts this locator consumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_fields: Vec<AddressPart>,
}

impl LocatorInfo {
    pub const DEFAULT_NAME: &'static str = "Default";

    /// The implicit locator of a non-composite geocoder.
    pub fn default_locator() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            title: Self::DEFAULT_NAME.to_string(),
            primary: true,
            enabled: true,
            kind: SublocatorType::Streets,
            internal_fields: Vec::new(),
        }
    }
}
