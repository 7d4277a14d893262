//! Vlanipam Core - Domain types for the VLAN IP allocation control plane
//!
//! This crate provides:
//! - The error taxonomy shared by every service layer
//! - IP normalization and the subnet/reservation model
//! - The allocation record document and its store key forms

pub mod error;
pub mod net;
pub mod record;

// Re-export commonly used types
pub use error::{IpamError, Result};
pub use net::{normalize, parse_bare, Subnet};
pub use record::{
    bare_from_key, canonical_key, legacy_key, AddressRecord, AllocationSource, DEFAULT_KEY_PREFIX,
};
