use crate::error::Result;
use crate::{AllocationStore, StoreConnector, StoredKey};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory allocation store for tests.
///
/// Clones share one map, so several "connections" observe the same
/// state, and `put_if_absent` holds the map lock across its
/// check-and-insert, giving it the same atomicity the etcd transaction
/// provides.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every key, for test assertions.
    pub async fn keys(&self) -> Vec<String> {
        self.inner.lock().await.keys().cloned().collect()
    }

    /// Fetch a single value, for test assertions.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl AllocationStore for MemoryStore {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<StoredKey>> {
        let map = self.inner.lock().await;
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| StoredKey {
                key: k.clone(),
                value: v.clone(),
                version: 1,
            })
            .collect())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.inner.lock().await.remove(key).is_some())
    }

    async fn put_if_absent(&self, guards: &[String], key: &str, value: &str) -> Result<bool> {
        let mut map = self.inner.lock().await;
        if guards.iter().any(|guard| map.contains_key(guard)) {
            debug!("memory store: guard key present, transaction not committed");
            return Ok(false);
        }
        map.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn status(&self) -> Result<()> {
        Ok(())
    }
}

/// Hands out connections to a shared `MemoryStore`.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn AllocationStore>> {
        Ok(Arc::new(self.store.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_scan_bounds() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2", "a").await.unwrap();
        store.put("/vlan/ip/10.0.0.3/24", "b").await.unwrap();
        store.put("/other/10.0.0.4", "c").await.unwrap();

        let keys = store.get_prefix("/vlan/ip/").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|kv| kv.key.starts_with("/vlan/ip/")));
        assert!(keys.iter().all(|kv| kv.version > 0));
    }

    #[tokio::test]
    async fn test_put_if_absent_commits_once() {
        let store = MemoryStore::new();
        let guards = vec!["/vlan/ip/10.0.0.2".to_string()];

        let first = store
            .put_if_absent(&guards, "/vlan/ip/10.0.0.2", "record")
            .await
            .unwrap();
        assert!(first);

        let second = store
            .put_if_absent(&guards, "/vlan/ip/10.0.0.2", "record")
            .await
            .unwrap();
        assert!(!second);
    }

    #[tokio::test]
    async fn test_put_if_absent_honors_every_guard() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2/24", "legacy").await.unwrap();

        let guards = vec![
            "/vlan/ip/10.0.0.2".to_string(),
            "/vlan/ip/10.0.0.2/24".to_string(),
        ];
        let committed = store
            .put_if_absent(&guards, "/vlan/ip/10.0.0.2", "record")
            .await
            .unwrap();
        assert!(!committed);
        assert!(store.get("/vlan/ip/10.0.0.2").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let store = MemoryStore::new();
        store.put("/vlan/ip/10.0.0.2", "record").await.unwrap();

        assert!(store.delete("/vlan/ip/10.0.0.2").await.unwrap());
        assert!(!store.delete("/vlan/ip/10.0.0.2").await.unwrap());
    }

    #[tokio::test]
    async fn test_connections_share_state() {
        let connector = MemoryConnector::default();
        let first = connector.connect().await.unwrap();
        first.put("/vlan/ip/10.0.0.9", "record").await.unwrap();

        let second = connector.connect().await.unwrap();
        assert!(second.delete("/vlan/ip/10.0.0.9").await.unwrap());
    }
}
