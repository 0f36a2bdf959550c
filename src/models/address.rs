//! Address value types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role of a single address component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressPart {
    /// Apartment, suite or unit designator
    Unit,
    /// Street line, usually including the house number
    AddressLine,
    /// City / town
    Locality1,
    /// District / neighbourhood
    Locality2,
    /// Sub-district
    Locality3,
    CountyPrefecture,
    PostalCode1,
    /// Postal code extension (e.g. ZIP+4)
    PostalCode2,
    StateProvince,
    Country,
    /// The whole address as one free-text line
    FullAddress,
}

impl AddressPart {
    /// All parts in the order used when composing a single address line.
    pub fn all() -> &'static [AddressPart] {
        &[
            AddressPart::Unit,
            AddressPart::AddressLine,
            AddressPart::Locality3,
            AddressPart::Locality2,
            AddressPart::Locality1,
            AddressPart::CountyPrefecture,
            AddressPart::StateProvince,
            AddressPart::PostalCode1,
            AddressPart::PostalCode2,
            AddressPart::Country,
            AddressPart::FullAddress,
        ]
    }

    /// Parse the snake_case name used in configuration files and CSV headers.
    pub fn from_name(name: &str) -> Option<Self> {
        AddressPart::all()
            .iter()
            .copied()
            .find(|part| part.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AddressPart::Unit => "unit",
            AddressPart::AddressLine => "address_line",
            AddressPart::Locality1 => "locality1",
            AddressPart::Locality2 => "locality2",
            AddressPart::Locality3 => "locality3",
            AddressPart::CountyPrefecture => "county_prefecture",
            AddressPart::PostalCode1 => "postal_code1",
            AddressPart::PostalCode2 => "postal_code2",
            AddressPart::StateProvince => "state_province",
            AddressPart::Country => "country",
            AddressPart::FullAddress => "full_address",
        }
    }
}

impl std::fmt::Display for AddressPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A postal address, addressed component-wise by [`AddressPart`].
///
/// Missing parts read as the empty string. An address with every part empty
/// is valid and can be detected with [`Address::is_empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    parts: BTreeMap<AddressPart, String>,

    /// Locator name as reported by the service (replaced by the locator
    /// title once resolved)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub match_method: String,
}

impl Address {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a free-text address.
    pub fn from_full_address(text: &str) -> Self {
        let mut address = Self::new();
        address.set(AddressPart::FullAddress, text);
        address
    }

    pub fn get(&self, part: AddressPart) -> &str {
        self.parts.get(&part).map(String::as_str).unwrap_or("")
    }

    /// Set a part. Setting an empty value clears it.
    pub fn set(&mut self, part: AddressPart, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.parts.remove(&part);
        } else {
            self.parts.insert(part, value);
        }
    }

    /// Builder-style variant of [`Address::set`].
    pub fn with(mut self, part: AddressPart, value: impl Into<String>) -> Self {
        self.set(part, value);
        self
    }

    /// True when no part carries any non-whitespace text.
    pub fn is_empty(&self) -> bool {
        self.parts.values().all(|v| v.trim().is_empty())
    }

    /// Iterate over the populated parts.
    pub fn parts(&self) -> impl Iterator<Item = (AddressPart, &str)> {
        self.parts.iter().map(|(part, value)| (*part, value.as_str()))
    }

    /// Join the populated structured parts into one line.
    ///
    /// Used when a single-line request is needed but no full address text
    /// was supplied.
    pub fn compose_line(&self) -> String {
        AddressPart::all()
            .iter()
            .filter(|part| **part != AddressPart::FullAddress)
            .map(|part| self.get(*part).trim())
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The full-address text, composed from the parts if it was not set.
    pub fn single_line(&self) -> String {
        let full = self.get(AddressPart::FullAddress).trim();
        if full.is_empty() {
            self.compose_line()
        } else {
            full.to_string()
        }
    }
}

/// Descriptor of one address field offered by the geocoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressField {
    pub title: String,
    pub part: AddressPart,
    pub visible: bool,
    pub description: String,
}

/// Whether the service expects one free-text line or a structured field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFormat {
    SingleField,
    MultipleFields,
}

impl AddressFormat {
    /// Detect the format from the configured field parts.
    ///
    /// A lone mapping decides by itself; with several mappings the service
    /// is single-line only if it prefers single-line input and a
    /// `FullAddress` mapping exists.
    pub fn detect(parts: &[AddressPart], single_line_input: bool) -> Self {
        match parts {
            [AddressPart::FullAddress] => AddressFormat::SingleField,
            [_] => AddressFormat::MultipleFields,
            _ => {
                if single_line_input && parts.contains(&AddressPart::FullAddress) {
                    AddressFormat::SingleField
                } else {
                    AddressFormat::MultipleFields
                }
            }
        }
    }
}
