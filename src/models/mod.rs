//! Address and locator data model.

pub mod address;
pub mod candidate;
pub mod locator;

pub use address::{Address, AddressField, AddressFormat, AddressPart};
pub use candidate::AddressCandidate;
pub use locator::{LocatorInfo, SublocatorType};
