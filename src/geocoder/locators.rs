//! Sub-locator lookup table.

use hashbrown::HashMap;

use crate::config::LocatorConfig;
use crate::models::{AddressCandidate, LocatorInfo};

/// Name → locator table, built once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct LocatorTable {
    locators: Vec<LocatorInfo>,
    /// Lowercased name → index into `locators`
    by_name: HashMap<String, usize>,
}

impl LocatorTable {
    pub fn new(locators: Vec<LocatorInfo>) -> Self {
        let by_name = locators
            .iter()
            .enumerate()
            .map(|(i, locator)| (locator.name.to_lowercase(), i))
            .collect();
        Self { locators, by_name }
    }

    pub fn from_config(configs: &[LocatorConfig]) -> Self {
        Self::new(configs.iter().map(LocatorConfig::to_info).collect())
    }

    pub fn locators(&self) -> &[LocatorInfo] {
        &self.locators
    }

    pub fn resolve(&self, match_method: &str) -> Option<&LocatorInfo> {
        self.by_name
            .get(&match_method.trim().to_lowercase())
            .map(|&i| &self.locators[i])
    }

    /// Attach the locator named by the candidate's match method.
    ///
    /// A resolved candidate reports the locator title as its match method.
    /// Unknown match methods are left untouched.
    pub fn apply(&self, candidate: &mut AddressCandidate) {
        if let Some(locator) = self.resolve(&candidate.address.match_method) {
            candidate.address.match_method = locator.title.clone();
            candidate.locator = Some(locator.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, SublocatorType};

    fn locator(name: &str, title: &str, primary: bool, enabled: bool) -> LocatorInfo {
        LocatorInfo {
            name: name.to_string(),
            title: title.to_string(),
            primary,
            enabled,
            kind: SublocatorType::Streets,
            internal_fields: Vec::new(),
        }
    }

    fn candidate_with_method(method: &str) -> AddressCandidate {
        let mut address = Address::new();
        address.match_method = method.to_string();
        AddressCandidate {
            address,
            ..AddressCandidate::default()
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let table = LocatorTable::new(vec![locator("US_Streets", "Streets", true, true)]);
        assert_eq!(table.resolve("us_streets").unwrap().title, "Streets");
        assert_eq!(table.resolve(" US_STREETS ").unwrap().title, "Streets");
        assert!(table.resolve("US_Street").is_none());
    }

    #[test]
    fn test_apply_overwrites_match_method() {
        let table = LocatorTable::new(vec![locator("US_Zip", "ZIP Code", false, false)]);
        let mut candidate = candidate_with_method("us_zip");

        table.apply(&mut candidate);
        assert_eq!(candidate.address.match_method, "ZIP Code");
        assert!(!candidate.is_usable());
    }

    #[test]
    fn test_unknown_method_fails_open() {
        let table = LocatorTable::new(vec![locator("US_Zip", "ZIP Code", false, false)]);
        let mut candidate = candidate_with_method("Custom_Parcels");

        table.apply(&mut candidate);
        assert_eq!(candidate.address.match_method, "Custom_Parcels");
        assert!(candidate.locator.is_none());
        assert!(candidate.is_usable());
    }
}
