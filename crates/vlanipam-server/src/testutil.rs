//! Shared test doubles for the service crate.

use crate::config::ServiceConfig;
use crate::refresh::{RefreshDetail, RefreshDriver, RefreshStatus};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vlanipam_cloud::{CloudError, CloudInventory};
use vlanipam_core::{IpamError, Result};

/// Configuration for tests that bypass the environment.
pub(crate) fn test_config() -> ServiceConfig {
    ServiceConfig {
        region: "us-east".to_string(),
        etcd_endpoints: vec!["127.0.0.1:2379".to_string()],
        subnet: Some("10.0.0.0/24".to_string()),
        ..ServiceConfig::default()
    }
}

/// Cloud inventory double with a fixed address list or a fixed failure.
#[derive(Default)]
pub(crate) struct MockCloud {
    addresses: Vec<String>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockCloud {
    pub(crate) fn with_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Counts `list_vlan_addresses` calls, for cache assertions.
    pub(crate) fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl CloudInventory for MockCloud {
    async fn list_vlan_addresses(
        &self,
        _region: &str,
    ) -> std::result::Result<Vec<String>, CloudError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CloudError::transient("mock cloud failure"));
        }
        Ok(self.addresses.clone())
    }

    async fn account_latency_ms(&self) -> std::result::Result<f64, CloudError> {
        if self.fail {
            return Err(CloudError::transient("mock cloud failure"));
        }
        Ok(12.5)
    }

    async fn check_region(&self, region: &str) -> std::result::Result<(), CloudError> {
        if self.fail || region == "no-such-region" {
            return Err(CloudError::transient(format!("unknown region {region}")));
        }
        Ok(())
    }
}

/// Refresh driver double that never touches a cluster.
#[derive(Default)]
pub(crate) struct MockRefresh {
    pub(crate) fail: bool,
}

#[async_trait]
impl RefreshDriver for MockRefresh {
    async fn start(&self) -> Result<String> {
        if self.fail {
            return Err(IpamError::refresh_failed("mock submit failure"));
        }
        Ok("vlan-ip-refresh-ab12cd".to_string())
    }

    async fn detail(&self, run_name: &str) -> Result<RefreshDetail> {
        if self.fail {
            return Err(IpamError::refresh_failed("mock lookup failure"));
        }
        Ok(RefreshDetail {
            status: RefreshStatus::Succeeded,
            started_at: Some("2026-01-01T00:00:00Z".to_string()),
            completed_at: Some("2026-01-01T00:01:00Z".to_string()),
            pod_name: Some(format!("{run_name}-pod")),
            logs: Some("synced 3 addresses".to_string()),
        })
    }
}
