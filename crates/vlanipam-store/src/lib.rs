//! Vlanipam Store - Allocation store abstraction and backends
//!
//! This crate provides:
//! - The `AllocationStore` trait the allocator mutates through
//! - The `StoreConnector` trait (one connection per public operation)
//! - An etcd backend with endpoint fail-over
//! - An in-memory backend with the same transaction semantics, for tests

pub mod error;
pub mod etcd;
pub mod memory;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use etcd::{EtcdConnector, EtcdStore};
pub use memory::{MemoryConnector, MemoryStore};

use async_trait::async_trait;
use std::sync::Arc;

/// One key/value pair read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub key: String,
    pub value: String,
    /// Store revision counter; 0 means the key does not exist.
    pub version: i64,
}

/// The store operations the allocation engine relies on.
///
/// Mutual exclusion between concurrent allocations comes entirely from
/// `put_if_absent`, which commits its write only while every guard key
/// is absent.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// All keys under the given prefix.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<StoredKey>>;

    /// Unconditional write.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; true if one was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomic claim: commit `put(key, value)` iff every key in `guards`
    /// has version 0 (does not exist). Returns whether the transaction
    /// committed.
    async fn put_if_absent(&self, guards: &[String], key: &str, value: &str) -> Result<bool>;

    /// Liveness probe against the backing store.
    async fn status(&self) -> Result<()>;
}

/// Acquires a store connection.
///
/// Every public allocator call reconnects rather than pooling.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn AllocationStore>>;
}

/// Reduce a configured endpoint to the `host:port` form the driver
/// expects: scheme stripped, trailing slash removed.
pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}
