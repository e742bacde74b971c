//! Per-key async locks
//!
//! Serializes the multi-step operations of the tiered cache (durable read
//! then promote, memory insert then write-through, remove from both tiers)
//! for a single key. Different keys never contend. Lock slots are dropped
//! once nobody holds or waits on them.

use dashmap::DashMap;
use lumen_core::CacheKey;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    slots: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub(crate) async fn lock(&self, key: &CacheKey) -> KeyGuard<'_> {
        // The shard lock must not be held across the await
        let slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());
        let guard = slot.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Keys with a live slot
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

pub(crate) struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: CacheKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own reference left: no holder, no waiter
        self.locks
            .slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_waits_for_release() {
        let locks = Arc::new(KeyLocks::new());
        let key = CacheKey::new("k");

        let held = locks.lock(&key).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let locks = KeyLocks::new();
        let _a = locks.lock(&CacheKey::new("a")).await;
        let _b = locks.lock(&CacheKey::new("b")).await;
        assert_eq!(locks.len(), 2);
    }
}
