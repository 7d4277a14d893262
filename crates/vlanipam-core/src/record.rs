use crate::net::normalize;
use chrono::{SecondsFormat, Utc};
use std::fmt;

/// Default store prefix under which one key per allocated address lives.
pub const DEFAULT_KEY_PREFIX: &str = "/vlan/ip/";

/// Provenance of an allocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationSource {
    /// Claimed through the allocate endpoint
    ApiAllocate,
    /// Imported by reconciliation from the cloud inventory
    LinodeSync,
    /// Seeded by a store initializer
    Initializer,
}

impl AllocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationSource::ApiAllocate => "api-allocate",
            AllocationSource::LinodeSync => "linode-sync",
            AllocationSource::Initializer => "initializer",
        }
    }
}

impl fmt::Display for AllocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value stored under an allocation key.
///
/// Rendered as human-readable `key = value` lines so operators can
/// inspect allocations with plain store-browsing tools. Records are
/// immutable once written and are never parsed back; only key existence
/// is consulted, so adding fields later is safe.
#[derive(Debug, Clone)]
pub struct AddressRecord {
    pub source: AllocationSource,
    pub region: String,
    pub subnet: String,
    pub allocated_at: String,
    pub linode_id: Option<i64>,
    pub notes: String,
}

impl AddressRecord {
    pub fn new(
        source: AllocationSource,
        region: impl Into<String>,
        subnet: impl Into<String>,
    ) -> Self {
        Self {
            source,
            region: region.into(),
            subnet: subnet.into(),
            allocated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            linode_id: None,
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Render the record as `key = value` text. The status field is
    /// constant: a key only exists while the address is allocated.
    pub fn to_kv_text(&self) -> String {
        let linode_id = self
            .linode_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        format!(
            "status = allocated\n\
             source = {}\n\
             region = {}\n\
             subnet = {}\n\
             allocated_at = {}\n\
             linode_id = {}\n\
             notes = {}\n",
            self.source, self.region, self.subnet, self.allocated_at, linode_id, self.notes
        )
    }
}

/// The only key form written by new allocations: `<prefix><bare-ip>`.
pub fn canonical_key(prefix: &str, bare: &str) -> String {
    format!("{prefix}{bare}")
}

/// Key form left behind by older initializers:
/// `<prefix><bare-ip>/<prefix-len>`. Read-tolerated, never written.
pub fn legacy_key(prefix: &str, bare: &str, prefix_len: u8) -> String {
    format!("{prefix}{bare}/{prefix_len}")
}

/// Recover the bare address from a stored key in either form.
///
/// Returns `None` for keys outside the prefix; the caller decides what
/// an empty remainder means.
pub fn bare_from_key(prefix: &str, key: &str) -> Option<String> {
    key.strip_prefix(prefix).map(normalize)
}
