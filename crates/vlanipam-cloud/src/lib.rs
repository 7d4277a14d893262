//! Vlanipam Cloud - Linode inventory client
//!
//! This crate provides:
//! - Credential loading from the linode-cli config file
//! - A retrying HTTP layer with backoff, jitter, and Retry-After handling
//! - The paginated instance/config walk that collects bound VLAN addresses
//! - Account and region probes for the health aggregator

pub mod client;
pub mod error;
pub mod token;

mod inventory;

// Re-export commonly used types
pub use client::{LinodeClient, RetryPolicy, DEFAULT_API_BASE};
pub use error::{CloudError, Result};
pub use token::load_token;

use async_trait::async_trait;

/// The cloud provider's view of the VLAN, as the allocator and the
/// health aggregator consume it. Implemented by `LinodeClient` and by
/// test doubles.
#[async_trait]
pub trait CloudInventory: Send + Sync {
    /// Bare addresses currently bound as VLAN interface addresses on
    /// any instance in the region. Order is irrelevant and duplicates
    /// are allowed; callers treat the result as a set.
    async fn list_vlan_addresses(&self, region: &str) -> Result<Vec<String>>;

    /// Round-trip latency of an authenticated account probe, in
    /// milliseconds.
    async fn account_latency_ms(&self) -> Result<f64>;

    /// Verify that the configured region exists at the provider.
    async fn check_region(&self, region: &str) -> Result<()>;
}
