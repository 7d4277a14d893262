use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A single-slot cache with an explicit TTL.
///
/// A TTL of zero disables the cache: every read misses. Writes always
/// restamp the refresh instant. Caches are per-process and are not
/// synchronized across replicas.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<Entry<T>>>,
}

struct Entry<T> {
    value: T,
    refreshed_at: Instant,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// The cached value, if one was written within the TTL.
    pub async fn get(&self) -> Option<T> {
        if self.ttl.is_zero() {
            return None;
        }
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|entry| entry.refreshed_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub async fn put(&self, value: T) {
        *self.slot.write().await = Some(Entry {
            value,
            refreshed_at: Instant::now(),
        });
    }
}
