//! Geocoder configuration loaded from TOML.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::GeocodeError;
use crate::models::{AddressField, AddressPart, LocatorInfo, SublocatorType};

pub const DEFAULT_MINIMUM_MATCH_SCORE: u8 = 80;
pub const DEFAULT_REVERSE_SEARCH_DISTANCE: f64 = 500.0;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocoderConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub response: ResponseFields,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
    #[serde(default)]
    pub locators: Vec<LocatorConfig>,
}

/// Which geocoder variant serves the configured endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeocoderKind {
    /// Multi-locator service; candidates name the locator that produced them
    Composite,
    /// Single-field world geocoding service
    World,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Feet,
    Miles,
}

impl DistanceUnit {
    pub fn to_meters(self, value: f64) -> f64 {
        match self {
            DistanceUnit::Meters => value,
            DistanceUnit::Kilometers => value * 1000.0,
            DistanceUnit::Feet => value * 0.3048,
            DistanceUnit::Miles => value * 1609.344,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    pub url: String,
    pub kind: GeocoderKind,
    /// Access token appended to every request
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub single_line_input: bool,
    #[serde(default = "default_minimum_match_score")]
    pub minimum_match_score: u8,
    #[serde(default)]
    pub minimum_candidate_score: u8,
    #[serde(default = "default_reverse_search_distance")]
    pub reverse_search_distance: f64,
    #[serde(default = "default_distance_unit")]
    pub distance_unit: DistanceUnit,
    /// Chunk size used when the service does not advertise one
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    /// Result field carrying the request row id in batch responses
    #[serde(default = "default_correlation_field")]
    pub correlation_field: String,
    /// Request field carrying the row id in batch requests
    #[serde(default = "default_object_id_field")]
    pub object_id_field: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Service attribute names the engine reads from responses.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResponseFields {
    pub shape: String,
    pub score: String,
    pub match_address: String,
    pub locator_name: String,
    pub address_type: String,
}

impl Default for ResponseFields {
    fn default() -> Self {
        Self {
            shape: "Shape".to_string(),
            score: "Score".to_string(),
            match_address: "Match_addr".to_string(),
            locator_name: "Loc_name".to_string(),
            address_type: "Addr_type".to_string(),
        }
    }
}

/// Mapping of one address part onto the service's field name.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldMapping {
    pub part: AddressPart,
    /// Field name the service expects
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub description: String,
}

impl FieldMapping {
    pub fn to_field(&self) -> AddressField {
        AddressField {
            title: self.title.clone().unwrap_or_else(|| self.name.clone()),
            part: self.part,
            visible: self.visible,
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocatorConfig {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub kind: SublocatorType,
    #[serde(default)]
    pub internal_fields: Vec<AddressPart>,
}

impl LocatorConfig {
    pub fn to_info(&self) -> LocatorInfo {
        LocatorInfo {
            name: self.name.clone(),
            title: self.title.clone().unwrap_or_else(|| self.name.clone()),
            primary: self.primary,
            enabled: self.enabled,
            kind: self.kind,
            internal_fields: self.internal_fields.clone(),
        }
    }
}

fn default_minimum_match_score() -> u8 {
    DEFAULT_MINIMUM_MATCH_SCORE
}

fn default_reverse_search_distance() -> f64 {
    DEFAULT_REVERSE_SEARCH_DISTANCE
}

fn default_distance_unit() -> DistanceUnit {
    DistanceUnit::Meters
}

fn default_batch_size() -> usize {
    100
}

fn default_correlation_field() -> String {
    "ResultID".to_string()
}

fn default_object_id_field() -> String {
    "OBJECTID".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl GeocoderConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: GeocoderConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Check the invariants the geocoders rely on.
    pub fn validate(&self) -> Result<(), GeocodeError> {
        let invalid = |msg: String| Err(GeocodeError::Configuration(msg));

        if self.service.url.trim().is_empty() {
            return invalid("service url is empty".to_string());
        }
        if self.fields.is_empty() {
            return invalid("no address field mappings configured".to_string());
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return invalid(format!("field mapping for '{}' has no name", field.part));
            }
            if self.fields[..i].iter().any(|f| f.part == field.part) {
                return invalid(format!("address part '{}' is mapped twice", field.part));
            }
        }
        for (label, score) in [
            ("minimum_match_score", self.service.minimum_match_score),
            ("minimum_candidate_score", self.service.minimum_candidate_score),
        ] {
            if score > 100 {
                return invalid(format!("{} {} is above 100", label, score));
            }
        }
        if !(self.service.reverse_search_distance > 0.0) {
            return invalid("reverse_search_distance must be positive".to_string());
        }
        if self.service.default_batch_size == 0 {
            return invalid("default_batch_size must be at least 1".to_string());
        }

        if self.service.kind == GeocoderKind::Composite {
            if self.locators.is_empty() {
                return invalid("composite geocoder has no locators".to_string());
            }
            if !self.locators.iter().any(|l| l.primary) {
                return invalid("composite geocoder has no primary locator".to_string());
            }
            for (i, locator) in self.locators.iter().enumerate() {
                if self.locators[..i]
                    .iter()
                    .any(|l| l.name.eq_ignore_ascii_case(&locator.name))
                {
                    return invalid(format!("locator '{}' is configured twice", locator.name));
                }
            }
        }

        Ok(())
    }

    /// Service field name mapped to a part.
    pub fn field_name(&self, part: AddressPart) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.part == part)
            .map(|f| f.name.as_str())
    }
}
