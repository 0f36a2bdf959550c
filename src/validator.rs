//! Plausibility check for address-point matches.
//!
//! Rooftop-level matches are prone to silent data errors, so each one is
//! reverse geocoded against a street-level geocoder and the street found
//! there must appear in the matched address text.

use std::sync::Arc;

use tracing::debug;

use crate::error::GeocodeError;
use crate::geocoder::Geocoder;
use crate::models::{AddressCandidate, AddressPart, SublocatorType};

/// Remove a house number from either end of an address line.
///
/// The number may lead ("123 Main St") or trail ("Main St 123") depending
/// on the locale. Lines with a single token are returned unchanged.
pub fn strip_house_number(line: &str) -> &str {
    let tokens: Vec<&str> = line.split(' ').collect();
    if tokens.len() < 2 {
        return line;
    }

    let first = tokens[0];
    let last = tokens[tokens.len() - 1];
    if first.parse::<i64>().is_ok() {
        line[first.len()..].trim_start()
    } else if last.parse::<i64>().is_ok() {
        line[..line.len() - last.len()].trim_end()
    } else {
        line
    }
}

/// Flags candidates whose location disagrees with their address text.
pub struct LocationValidator {
    streets: Arc<dyn Geocoder>,
}

impl LocationValidator {
    /// `streets` must be a street-level geocoder, distinct from the one that
    /// produced the candidates.
    pub fn new(streets: Arc<dyn Geocoder>) -> Self {
        Self { streets }
    }

    /// Lazily yield the indices of implausible candidates.
    ///
    /// Calling it again restarts the check. A credentials failure of the
    /// street geocoder is yielded once and ends the iteration.
    pub fn find_incorrect_locations<'a>(&'a self, candidates: &'a [Option<AddressCandidate>]) -> IncorrectLocations<'a> {
        IncorrectLocations {
            streets: self.streets.as_ref(),
            candidates,
            next: 0,
            done: false,
        }
    }
}

/// Check one candidate. `Ok(None)` means it is not subject to the check.
fn check_candidate(streets: &dyn Geocoder, candidate: &AddressCandidate) -> Result<Option<bool>, GeocodeError> {
    let is_address_point = candidate
        .locator
        .as_ref()
        .map_or(false, |l| l.kind == SublocatorType::AddressPoint);
    if !is_address_point {
        return Ok(None);
    }

    let Some(location) = candidate.location else {
        return Ok(Some(false));
    };
    let reversed = match streets.reverse_geocode(location) {
        Ok(Some(address)) => address,
        Ok(None) => return Ok(Some(false)),
        Err(GeocodeError::InvalidArgument(_)) => return Ok(Some(false)),
        Err(e) => return Err(e),
    };

    let full_address = candidate.full_address().to_uppercase();
    let line = reversed.get(AddressPart::AddressLine).to_uppercase();
    let street = if reversed.get(AddressPart::Unit).is_empty() {
        strip_house_number(&line)
    } else {
        line.as_str()
    };

    let plausible = full_address.contains(street);
    if !plausible {
        debug!(
            "Street '{}' at reverse geocoded location not found in '{}'",
            street, full_address
        );
    }
    Ok(Some(plausible))
}

/// Iterator returned by [`LocationValidator::find_incorrect_locations`].
#[derive(Clone)]
pub struct IncorrectLocations<'a> {
    streets: &'a dyn Geocoder,
    candidates: &'a [Option<AddressCandidate>],
    next: usize,
    done: bool,
}

impl Iterator for IncorrectLocations<'_> {
    type Item = Result<usize, GeocodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.next < self.candidates.len() {
            let index = self.next;
            self.next += 1;

            let Some(candidate) = &self.candidates[index] else {
                continue;
            };
            match check_candidate(self.streets, candidate) {
                Ok(Some(false)) => return Some(Ok(index)),
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl std::iter::FusedIterator for IncorrectLocations<'_> {}
