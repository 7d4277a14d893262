use crate::cache::TtlCache;
use crate::config::ServiceConfig;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vlanipam_cloud::CloudInventory;
use vlanipam_core::{
    bare_from_key, canonical_key, legacy_key, normalize, AddressRecord, AllocationSource,
    IpamError, Result, Subnet,
};
use vlanipam_store::{AllocationStore, StoreConnector};

/// A committed allocation as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationOutcome {
    /// Bare dotted-quad.
    pub ip: String,
    /// `/<prefix>` of the requested subnet.
    pub cidr: String,
    /// `<ip>/<prefix>`, kept for legacy callers.
    pub allocated_ip: String,
}

/// The allocation engine.
///
/// The store is the single source of truth for what this service has
/// claimed; the cloud inventory is authoritative for what is actually
/// bound to an interface but lags. Every allocate converges the store
/// toward the cloud view before scanning for a free candidate, and the
/// claim itself is a compare-and-swap transaction so concurrent
/// requests from many nodes can never double-allocate.
pub struct Allocator {
    config: Arc<ServiceConfig>,
    connector: Arc<dyn StoreConnector>,
    cloud: Arc<dyn CloudInventory>,
    inventory_cache: TtlCache<Vec<String>>,
}

impl Allocator {
    pub fn new(
        config: Arc<ServiceConfig>,
        connector: Arc<dyn StoreConnector>,
        cloud: Arc<dyn CloudInventory>,
    ) -> Self {
        let inventory_cache = TtlCache::new(config.cache_ttl);
        Self {
            config,
            connector,
            cloud,
            inventory_cache,
        }
    }

    async fn connect_store(&self) -> Result<Arc<dyn AllocationStore>> {
        self.connector
            .connect()
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))
    }

    /// The region's VLAN inventory, from the TTL cache when it is warm.
    async fn cloud_inventory(&self) -> Result<Vec<String>> {
        if let Some(cached) = self.inventory_cache.get().await {
            debug!("using cached VLAN inventory ({} addresses)", cached.len());
            return Ok(cached);
        }
        let fresh = self
            .cloud
            .list_vlan_addresses(&self.config.region)
            .await
            .map_err(|e| IpamError::cloud_unavailable(e.to_string()))?;
        self.inventory_cache.put(fresh.clone()).await;
        Ok(fresh)
    }

    /// Allocate the lowest free host in `subnet_input`.
    ///
    /// An address is free when it is not reserved by policy, not
    /// recorded in the store under either key form, and not observed on
    /// any instance's VLAN interface. Allocation aborts when the cloud
    /// inventory cannot be fetched; a stale view could hand out an
    /// address a node has already attached.
    pub async fn allocate(&self, subnet_input: &str) -> Result<AllocationOutcome> {
        let subnet = Subnet::parse(subnet_input)?;
        let prefix = &self.config.key_prefix;
        let store = self.connect_store().await?;

        let stored = store
            .get_prefix(prefix)
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))?;
        let used_store: HashSet<String> = stored
            .iter()
            .filter_map(|kv| bare_from_key(prefix, &kv.key))
            .filter(|bare| !bare.is_empty())
            .collect();

        let used_cloud: HashSet<String> = self
            .cloud_inventory()
            .await?
            .iter()
            .map(|address| normalize(address))
            .filter(|bare| !bare.is_empty())
            .collect();

        self.import_cloud_addresses(store.as_ref(), &subnet, &used_store, &used_cloud)
            .await;

        let mut used = used_store;
        used.extend(used_cloud);

        let reserved = subnet.reserved();
        let mut attempted = 0usize;
        let mut skipped_reserved = 0usize;
        let mut skipped_used = 0usize;

        for host in subnet.hosts() {
            attempted += 1;
            if reserved.contains(&host) {
                skipped_reserved += 1;
                continue;
            }
            let bare = host.to_string();
            if used.contains(&bare) {
                skipped_used += 1;
                continue;
            }

            if self.claim(store.as_ref(), &subnet, &bare).await? {
                info!("allocated {bare}{}", subnet.cidr_suffix());
                return Ok(AllocationOutcome {
                    allocated_ip: format!("{bare}{}", subnet.cidr_suffix()),
                    cidr: subnet.cidr_suffix(),
                    ip: bare,
                });
            }

            // lost to a concurrent claim or an in-flight legacy entry
            debug!("claim on {bare} did not commit, trying next candidate");
            skipped_used += 1;
        }

        Err(IpamError::subnet_exhausted(
            subnet.to_string(),
            attempted,
            skipped_reserved,
            skipped_used,
        ))
    }

    /// Best-effort import of cloud-observed addresses the store does
    /// not know about. A failed import transaction is logged and
    /// ignored; the address is still considered used this round.
    async fn import_cloud_addresses(
        &self,
        store: &dyn AllocationStore,
        subnet: &Subnet,
        used_store: &HashSet<String>,
        used_cloud: &HashSet<String>,
    ) {
        for bare in used_cloud.difference(used_store) {
            let key = canonical_key(&self.config.key_prefix, bare);
            let record = AddressRecord::new(
                AllocationSource::LinodeSync,
                &self.config.region,
                subnet.to_string(),
            );
            match store
                .put_if_absent(&[key.clone()], &key, &record.to_kv_text())
                .await
            {
                Ok(true) => debug!("imported cloud-observed address {bare}"),
                Ok(false) => debug!("cloud-observed address {bare} already recorded"),
                Err(e) => warn!("failed to import cloud-observed address {bare}: {e}"),
            }
        }
    }

    /// Atomic claim of one candidate.
    ///
    /// Both key forms guard the transaction: a concurrent fresh claim
    /// writes the canonical key, while an in-flight migration may still
    /// hold only the legacy one.
    async fn claim(&self, store: &dyn AllocationStore, subnet: &Subnet, bare: &str) -> Result<bool> {
        let prefix = &self.config.key_prefix;
        let canonical = canonical_key(prefix, bare);
        let legacy = legacy_key(prefix, bare, subnet.prefix_len());
        let record = AddressRecord::new(
            AllocationSource::ApiAllocate,
            &self.config.region,
            subnet.to_string(),
        );
        store
            .put_if_absent(&[canonical.clone(), legacy], &canonical, &record.to_kv_text())
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))
    }

    /// Release an address back to the pool.
    ///
    /// Deletes both key forms; succeeds when either existed. Repeated
    /// releases of a no-longer-present address all yield NotAllocated,
    /// never corruption.
    pub async fn release(&self, ip_input: &str) -> Result<String> {
        let addr: Ipv4Addr = vlanipam_core::parse_bare(ip_input)?;
        let bare = addr.to_string();

        let subnet_str = self
            .config
            .subnet
            .as_deref()
            .ok_or_else(|| IpamError::missing_config("SUBNET"))?;
        let subnet = Subnet::parse(subnet_str)?;

        if subnet.reserved().contains(&addr) {
            return Err(IpamError::cannot_release_reserved(bare));
        }

        let store = self.connect_store().await?;
        let prefix = &self.config.key_prefix;
        let removed_canonical = store
            .delete(&canonical_key(prefix, &bare))
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))?;
        let removed_legacy = store
            .delete(&legacy_key(prefix, &bare, subnet.prefix_len()))
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))?;

        if removed_canonical || removed_legacy {
            info!("released {bare}");
            Ok(bare)
        } else {
            Err(IpamError::not_allocated(bare))
        }
    }

    /// Every allocated address known to the store, numerically sorted.
    pub async fn list_ips(&self) -> Result<Vec<String>> {
        let store = self.connect_store().await?;
        let stored = store
            .get_prefix(&self.config.key_prefix)
            .await
            .map_err(|e| IpamError::store_unavailable(e.to_string()))?;

        let mut addresses: Vec<Ipv4Addr> = stored
            .iter()
            .filter_map(|kv| bare_from_key(&self.config.key_prefix, &kv.key))
            .filter_map(|bare| bare.parse().ok())
            .collect();
        addresses.sort_unstable();
        addresses.dedup();
        Ok(addresses.iter().map(|ip| ip.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, MockCloud};
    use vlanipam_store::{MemoryConnector, MemoryStore};

    fn make_allocator(store: MemoryStore, cloud: MockCloud) -> Allocator {
        Allocator::new(
            Arc::new(test_config()),
            Arc::new(MemoryConnector::new(store)),
            Arc::new(cloud),
        )
    }

    #[tokio::test]
    async fn test_clean_allocate_skips_gateway() {
        let store = MemoryStore::new();
        let allocator = make_allocator(store.clone(), MockCloud::default());

        let outcome = allocator.allocate("10.0.0.0/24").await.unwrap();
        assert_eq!(outcome.ip, "10.0.0.2");
        assert_eq!(outcome.cidr, "/24");
        assert_eq!(outcome.allocated_ip, "10.0.0.2/24");
        assert!(store.get("/vlan/ip/10.0.0.2").await.is_some());
    }

    #[tokio::test]
    async fn test_cloud_observed_addresses_are_skipped_and_imported() {
        let store = MemoryStore::new();
        let cloud = MockCloud::with_addresses(["10.0.0.2", "10.0.0.3"]);
        let allocator = make_allocator(store.clone(), cloud);

        let outcome = allocator.allocate("10.0.0.0/24").await.unwrap();
        assert_eq!(outcome.ip, "10.0.0.4");

        // the cloud-only addresses were imported with sync provenance
        for bare in ["10.0.0.2", "10.0.0.3"] {
            let value = store.get(&format!("/vlan/ip/{bare}")).await.unwrap();
            assert!(value.contains("source = linode-sync"));
        }
        let value = store.get("/vlan/ip/10.0.0.4").await.unwrap();
        assert!(value.contains("source = api-allocate"));
    }

    #[tokio::test]
    async fn test_cloud_inventory_with_cidr_suffixes_is_normalized() {
        let store = MemoryStore::new();
        let cloud = MockCloud::with_addresses(["10.0.0.2/24", " 10.0.0.3/24 "]);
        let allocator = make_allocator(store.clone(), cloud);

        let outcome = allocator.allocate("10.0.0.0/24").await.unwrap();
        assert_eq!(outcome.ip, "10.0.0.4");
        assert!(store.get("/vlan/ip/10.0.0.2").await.is_some());
    }

    #[tokio::test]
    async fn test_legacy_key_blocks_allocation() {
        let store = MemoryStore::new();
        store
            .put("/vlan/ip/10.0.0.2/24", "legacy record")
            .await
            .unwrap();
        let allocator = make_allocator(store.clone(), MockCloud::default());

        let outcome = allocator.allocate("10.0.0.0/24").await.unwrap();
        assert_eq!(outcome.ip, "10.0.0.3");
    }

    #[tokio::test]
    async fn test_cloud_failure_aborts_allocation() {
        let store = MemoryStore::new();
        let allocator = make_allocator(store.clone(), MockCloud::failing());

        let err = allocator.allocate("10.0.0.0/24").await.unwrap_err();
        assert!(matches!(err, IpamError::CloudUnavailable { .. }));
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_subnet() {
        let allocator = make_allocator(MemoryStore::new(), MockCloud::default());
        let err = allocator.allocate("not-a-subnet").await.unwrap_err();
        assert!(matches!(err, IpamError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_unique() {
        let store = MemoryStore::new();
        let allocator = Arc::new(make_allocator(store.clone(), MockCloud::default()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator.allocate("10.0.0.0/24").await.unwrap().ip
            }));
        }

        let mut ips = HashSet::new();
        for handle in handles {
            assert!(ips.insert(handle.await.unwrap()));
        }
        assert_eq!(ips.len(), 8);
    }

    #[tokio::test]
    async fn test_concurrent_claims_on_tiny_subnet() {
        // /30 hosts are .1 and .2; .1 is the reserved gateway slot, so
        // exactly one of two concurrent requests can win .2
        let store = MemoryStore::new();
        let allocator = Arc::new(make_allocator(store.clone(), MockCloud::default()));

        let first = tokio::spawn({
            let allocator = allocator.clone();
            async move { allocator.allocate("10.0.0.0/30").await }
        });
        let second = tokio::spawn({
            let allocator = allocator.clone();
            async move { allocator.allocate("10.0.0.0/30").await }
        });

        let results = [first.await.unwrap(), second.await.unwrap()];
        let won: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(won.len(), 1);
        assert_eq!(won[0].as_ref().unwrap().ip, "10.0.0.2");
        let lost = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            lost.as_ref().unwrap_err(),
            IpamError::SubnetExhausted { .. }
        ));
    }

    #[tokio::test]
    async fn test_exhaustion_counts_sum_to_host_range() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2", "record").await.unwrap();
        let allocator = make_allocator(store, MockCloud::default());

        // /30: two hosts, .1 reserved, .2 used
        let err = allocator.allocate("10.0.0.0/30").await.unwrap_err();
        match err {
            IpamError::SubnetExhausted {
                attempted,
                reserved,
                used,
                ..
            } => {
                assert_eq!(attempted, 2);
                assert_eq!(reserved, 1);
                assert_eq!(used, 1);
                assert_eq!(reserved + used, attempted);
            }
            other => panic!("expected SubnetExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slash31_is_immediately_exhausted() {
        let allocator = make_allocator(MemoryStore::new(), MockCloud::default());
        let err = allocator.allocate("10.0.0.0/31").await.unwrap_err();
        assert!(matches!(
            err,
            IpamError::SubnetExhausted {
                attempted: 2,
                reserved: 2,
                used: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_release_canonical_key() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2", "record").await.unwrap();
        let allocator = make_allocator(store.clone(), MockCloud::default());

        let released = allocator.release("10.0.0.2/24").await.unwrap();
        assert_eq!(released, "10.0.0.2");
        assert!(store.get("/vlan/ip/10.0.0.2").await.is_none());
    }

    #[tokio::test]
    async fn test_release_legacy_key_only() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2/24", "record").await.unwrap();
        let allocator = make_allocator(store.clone(), MockCloud::default());

        let released = allocator.release("10.0.0.2").await.unwrap();
        assert_eq!(released, "10.0.0.2");
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_release_removes_both_key_forms() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2", "record").await.unwrap();
        store.put("/vlan/ip/10.0.0.2/24", "record").await.unwrap();
        let allocator = make_allocator(store.clone(), MockCloud::default());

        allocator.release("10.0.0.2").await.unwrap();
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2", "record").await.unwrap();
        let allocator = make_allocator(store.clone(), MockCloud::default());

        allocator.release("10.0.0.2").await.unwrap();
        let err = allocator.release("10.0.0.2").await.unwrap_err();
        assert!(matches!(err, IpamError::NotAllocated { .. }));
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_release_reserved_is_rejected() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.9", "record").await.unwrap();
        let allocator = make_allocator(store.clone(), MockCloud::default());

        for reserved in ["10.0.0.0", "10.0.0.1", "10.0.0.255"] {
            let err = allocator.release(reserved).await.unwrap_err();
            assert!(matches!(err, IpamError::CannotReleaseReserved { .. }));
        }
        // the store is untouched
        assert_eq!(store.keys().await, vec!["/vlan/ip/10.0.0.9".to_string()]);
    }

    #[tokio::test]
    async fn test_release_requires_subnet_config() {
        let mut config = test_config();
        config.subnet = None;
        let allocator = Allocator::new(
            Arc::new(config),
            Arc::new(MemoryConnector::default()),
            Arc::new(MockCloud::default()),
        );

        let err = allocator.release("10.0.0.2").await.unwrap_err();
        assert!(matches!(err, IpamError::MissingConfig { .. }));
    }

    #[tokio::test]
    async fn test_list_ips_sorted_numerically() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.10", "record").await.unwrap();
        store.put("/vlan/ip/10.0.0.2", "record").await.unwrap();
        store.put("/vlan/ip/10.0.0.2/24", "record").await.unwrap();
        store.put("/vlan/ip/9.0.0.1", "record").await.unwrap();
        let allocator = make_allocator(store, MockCloud::default());

        let ips = allocator.list_ips().await.unwrap();
        // numeric order, both key forms collapsed
        assert_eq!(ips, vec!["9.0.0.1", "10.0.0.2", "10.0.0.10"]);
    }

    #[tokio::test]
    async fn test_inventory_cache_reused_within_ttl() {
        let mut config = test_config();
        config.cache_ttl = std::time::Duration::from_secs(60);
        let store = MemoryStore::new();
        let cloud = MockCloud::with_addresses(["10.0.0.2"]);
        let calls = cloud.call_counter();
        let allocator = Allocator::new(
            Arc::new(config),
            Arc::new(MemoryConnector::new(store.clone())),
            Arc::new(cloud),
        );

        allocator.allocate("10.0.0.0/24").await.unwrap();
        allocator.allocate("10.0.0.0/24").await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
