//! Mapping between address parts and service field names.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::FieldMapping;
use crate::error::GeocodeError;
use crate::models::{Address, AddressField, AddressFormat, AddressPart};
use crate::transport::PropertySet;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Trim and turn every whitespace run (tabs and line breaks included) into
/// one space.
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Case-insensitive property lookup, exact match first.
pub fn lookup<'a>(props: &'a PropertySet, key: &str) -> Option<&'a Value> {
    props.get(key).or_else(|| {
        props
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Render a scalar property as text.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Configured field mappings plus the address format derived from them.
#[derive(Debug, Clone)]
pub struct FieldMap {
    mappings: Vec<FieldMapping>,
    format: AddressFormat,
}

impl FieldMap {
    pub fn new(mappings: Vec<FieldMapping>, single_line_input: bool) -> Self {
        let parts: Vec<AddressPart> = mappings.iter().map(|m| m.part).collect();
        let format = AddressFormat::detect(&parts, single_line_input);
        Self { mappings, format }
    }

    pub fn format(&self) -> AddressFormat {
        self.format
    }

    pub fn name_of(&self, part: AddressPart) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.part == part)
            .map(|m| m.name.as_str())
    }

    /// Fields relevant to the detected format.
    pub fn address_fields(&self) -> Vec<AddressField> {
        self.mappings
            .iter()
            .filter(|m| match self.format {
                AddressFormat::SingleField => m.part == AddressPart::FullAddress,
                AddressFormat::MultipleFields => m.part != AddressPart::FullAddress,
            })
            .map(FieldMapping::to_field)
            .collect()
    }

    /// Request attributes for a single-address request.
    ///
    /// Fails with an argument error when the address carries nothing the
    /// active format could send.
    pub fn request_attributes(&self, address: &Address) -> Result<Vec<(String, String)>, GeocodeError> {
        let attributes = match self.format {
            AddressFormat::SingleField => {
                let name = self.name_of(AddressPart::FullAddress).ok_or_else(|| {
                    GeocodeError::Configuration("single field format without full address mapping".into())
                })?;
                vec![(name.to_string(), address.single_line())]
            }
            AddressFormat::MultipleFields => self.structured_attributes(address),
        };

        if attributes.iter().all(|(_, value)| value.is_empty()) {
            return Err(GeocodeError::InvalidArgument(
                "address has no populated fields for the active address format".into(),
            ));
        }
        Ok(attributes)
    }

    /// Request attributes for one batch row, `None` if the address is empty.
    ///
    /// Single-field batch rows use `single_field_name`, the name the service
    /// itself reports, instead of the logical full-address mapping.
    pub fn batch_attributes(&self, address: &Address, single_field_name: &str) -> Option<Vec<(String, String)>> {
        let attributes = match self.format {
            AddressFormat::SingleField => {
                vec![(single_field_name.to_string(), address.single_line())]
            }
            AddressFormat::MultipleFields => self.structured_attributes(address),
        };

        if attributes.iter().all(|(_, value)| value.is_empty()) {
            None
        } else {
            Some(attributes)
        }
    }

    fn structured_attributes(&self, address: &Address) -> Vec<(String, String)> {
        self.mappings
            .iter()
            .filter(|m| m.part != AddressPart::FullAddress)
            .map(|m| (m.name.clone(), address.get(m.part).trim().to_string()))
            .collect()
    }

    /// Mirror of the request mapping: pick every response key that names a
    /// configured field.
    pub fn parse_address(&self, props: &PropertySet) -> Address {
        let mut address = Address::new();
        for (key, value) in props {
            let Some(mapping) = self
                .mappings
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(key))
            else {
                continue;
            };
            if let Some(text) = value_text(value) {
                address.set(mapping.part, clean_text(&text));
            }
        }
        address
    }
}
