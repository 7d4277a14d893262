use crate::cache::TtlCache;
use crate::config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vlanipam_cloud::CloudInventory;
use vlanipam_core::{IpamError, Result};
use vlanipam_store::StoreConnector;

const REGION_CACHE_TTL: Duration = Duration::from_secs(3600);
const SLOW_PROBE_MS: f64 = 200.0;
const MEMORY_PRESSURE_PCT: u64 = 90;

/// Outcome of a passing health check.
#[derive(Debug, Clone, Copy)]
pub struct HealthReport {
    /// Round-trip latency of the cloud account probe.
    pub latency_ms: f64,
}

/// Composes the service's liveness signals: cloud reachability with a
/// valid credential, region validity (cached for an hour), allocation
/// store reachability, and local resource pressure.
pub struct HealthAggregator {
    config: Arc<ServiceConfig>,
    cloud: Arc<dyn CloudInventory>,
    connector: Arc<dyn StoreConnector>,
    region_cache: TtlCache<bool>,
}

impl HealthAggregator {
    pub fn new(
        config: Arc<ServiceConfig>,
        cloud: Arc<dyn CloudInventory>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        Self {
            config,
            cloud,
            connector,
            region_cache: TtlCache::new(REGION_CACHE_TTL),
        }
    }

    pub async fn check(&self) -> Result<HealthReport> {
        let latency_ms = self.cloud.account_latency_ms().await.map_err(|e| {
            if e.is_credentials() {
                IpamError::credentials_unavailable(e.to_string())
            } else {
                IpamError::cloud_unavailable(e.to_string())
            }
        })?;
        if latency_ms > SLOW_PROBE_MS {
            warn!("cloud API latency is high: {latency_ms:.2} ms");
        }

        self.check_region().await?;

        let store = self
            .connector
            .connect()
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))?;
        store
            .status()
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))?;

        check_local_pressure()?;

        debug!("health check passed ({latency_ms:.2} ms account probe)");
        Ok(HealthReport { latency_ms })
    }

    /// Region validity, revalidated against the provider once per cache
    /// period. A cached negative stays negative until the TTL lapses.
    async fn check_region(&self) -> Result<()> {
        let region = &self.config.region;
        let valid = match self.region_cache.get().await {
            Some(cached) => cached,
            None => {
                let fresh = self.cloud.check_region(region).await.is_ok();
                self.region_cache.put(fresh).await;
                fresh
            }
        };
        if valid {
            Ok(())
        } else {
            Err(IpamError::cloud_unavailable(format!(
                "invalid or unavailable region {region}"
            )))
        }
    }
}

/// Local liveness: refuse to report healthy under heavy load or memory
/// pressure.
fn check_local_pressure() -> Result<()> {
    let load = sys_info::loadavg()
        .map_err(|e| IpamError::unhealthy(format!("failed to read load average: {e}")))?;
    let cpus = sys_info::cpu_num()
        .map_err(|e| IpamError::unhealthy(format!("failed to detect CPU count: {e}")))?;
    let mem = sys_info::mem_info()
        .map_err(|e| IpamError::unhealthy(format!("failed to read memory info: {e}")))?;

    let memory_used_pct = if mem.total == 0 {
        0
    } else {
        (mem.total.saturating_sub(mem.avail)) * 100 / mem.total
    };

    if let Some(reason) = pressure_verdict(load.one, cpus, memory_used_pct) {
        warn!("{reason}");
        return Err(IpamError::unhealthy(reason));
    }
    Ok(())
}

/// Pure pressure rule: 1-minute load above twice the CPU count, or
/// memory use above 90%.
fn pressure_verdict(load_one: f64, cpus: u32, memory_used_pct: u64) -> Option<String> {
    if load_one > cpus as f64 * 2.0 {
        return Some(format!(
            "system load {load_one:.2} exceeds budget for {cpus} CPU(s)"
        ));
    }
    if memory_used_pct > MEMORY_PRESSURE_PCT {
        return Some(format!("memory use at {memory_used_pct}%"));
    }
    None
}
