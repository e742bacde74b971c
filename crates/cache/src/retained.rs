//! Host-owned storage that outlives UI containers
//!
//! A [`Retainer`] is injected by the host. The pipeline parks its
//! [`TieredCache`] there on first use and picks the same instance up again
//! when a container is recreated. Nothing is torn down implicitly.

use crate::tiered::TieredCache;
use dashmap::DashMap;
use lumen_core::{LoaderConfig, Result, RETAINED_CACHE_KEY};
use std::any::Any;
use std::sync::Arc;

pub type RetainedObject = Arc<dyn Any + Send + Sync>;

/// Key-value store that survives container re-creation
pub trait Retainer: Send + Sync {
    fn get(&self, key: &str) -> Option<RetainedObject>;
    fn put(&self, key: &str, value: RetainedObject);
}

/// Process-local retainer
#[derive(Default)]
pub struct InMemoryRetainer {
    slots: DashMap<String, RetainedObject>,
}

impl InMemoryRetainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Retainer for InMemoryRetainer {
    fn get(&self, key: &str) -> Option<RetainedObject> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    fn put(&self, key: &str, value: RetainedObject) {
        self.slots.insert(key.to_string(), value);
    }
}

/// Fetch the retained cache, building and retaining one on first use.
///
/// Two callers racing on an empty retainer may both build a cache; the last
/// `put` wins and the other instance is dropped once its caller is done.
pub async fn retained_cache(
    retainer: &dyn Retainer,
    config: &LoaderConfig,
) -> Result<Arc<TieredCache>> {
    if let Some(existing) = retainer.get(RETAINED_CACHE_KEY) {
        match existing.downcast::<TieredCache>() {
            Ok(cache) => {
                tracing::debug!("Reusing retained cache");
                return Ok(cache);
            }
            Err(_) => {
                tracing::warn!(
                    slot = RETAINED_CACHE_KEY,
                    "Retained slot holds a foreign object; replacing it"
                );
            }
        }
    }

    let cache = Arc::new(TieredCache::open(config).await?);
    retainer.put(RETAINED_CACHE_KEY, cache.clone());
    Ok(cache)
}
