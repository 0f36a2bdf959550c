//! Geocoding result record.

use geo_types::Point;
use serde::{Deserialize, Serialize};

use super::{Address, AddressPart, LocatorInfo};

/// One match returned by the geocoding service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressCandidate {
    pub address: Address,

    /// Matched location (x = longitude, y = latitude)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Point<f64>>,

    /// Relative match confidence, 100 = exact
    pub score: u8,

    /// Resolved sub-locator; `None` for non-composite geocoders and for
    /// match methods that did not resolve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<LocatorInfo>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address_type: String,
}

impl AddressCandidate {
    /// The matched full address text.
    pub fn full_address(&self) -> &str {
        self.address.get(AddressPart::FullAddress)
    }

    /// A candidate is usable unless it resolved to a disabled locator.
    pub fn is_usable(&self) -> bool {
        self.locator.as_ref().map_or(true, |locator| locator.enabled)
    }
}
