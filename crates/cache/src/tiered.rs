//! Memory tier in front of a durable store

use crate::entry::CacheEntry;
use crate::locks::KeyLocks;
use crate::memory::MemoryTier;
use crate::stats::{CacheStatistics, CacheStats};
use crate::storage::{DiskStore, DurableStore};
use lumen_core::{CacheKey, DecodedImage, LoaderConfig, Result};
use std::sync::Arc;
use tracing::instrument;

/// Which tier answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Durable,
}

/// A successful lookup and the tier that served it
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub tier: Tier,
}

/// What happened during a `put`
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub entry: CacheEntry,
    /// False when the entry outweighs the whole memory budget
    pub memory_admitted: bool,
    pub evicted: Vec<CacheKey>,
    /// False when the durable write failed; the memory tier is unaffected
    pub persisted: bool,
}

/// Two-tier image cache
///
/// Reads check memory first and fall back to the durable store, promoting
/// durable hits into memory. Writes go to memory and through to the durable
/// store. Durable failures degrade to misses or unpersisted writes and are
/// only logged: nothing here returns a storage error to a loader.
///
/// Promotion, `put` and `invalidate` hold a per-key lock across both tiers,
/// so an invalidated key cannot be resurrected by a promotion that read the
/// durable tier just before it, and a promotion never overwrites a newer put.
pub struct TieredCache {
    memory: MemoryTier,
    durable: Arc<dyn DurableStore>,
    locks: KeyLocks,
    stats: CacheStats,
}

impl TieredCache {
    pub fn new(memory_budget: u64, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            memory: MemoryTier::new(memory_budget),
            durable,
            locks: KeyLocks::new(),
            stats: CacheStats::default(),
        }
    }

    /// Build a cache backed by a [`DiskStore`] under `config.cache_dir`
    pub async fn open(config: &LoaderConfig) -> Result<Self> {
        config.validate()?;
        let store = DiskStore::from_config(config).await?;
        tracing::info!(
            cache_dir = %config.cache_dir.display(),
            memory_budget = config.memory_budget_bytes,
            "Opened tiered cache"
        );
        Ok(Self::new(config.memory_budget_bytes, Arc::new(store)))
    }

    /// Look up `key`, reporting which tier served it
    #[instrument(level = "debug", skip_all, fields(key = %key))]
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheHit> {
        if let Some(hit) = self.memory_hit(key) {
            return Some(hit);
        }

        let _guard = self.locks.lock(key).await;
        // A put or promotion may have landed while we waited
        if let Some(hit) = self.memory_hit(key) {
            return Some(hit);
        }

        match self.durable.load(key).await {
            Ok(Some(image)) => {
                let entry = CacheEntry::new(key.clone(), image);
                let admission = self.memory.insert(entry.clone());
                self.stats.record_evictions(admission.evicted.len());
                self.stats.record_durable_hit();
                tracing::debug!(
                    promoted = admission.admitted,
                    evicted = admission.evicted.len(),
                    "Durable hit"
                );
                Some(CacheHit {
                    entry,
                    tier: Tier::Durable,
                })
            }
            Ok(None) => {
                self.stats.record_miss();
                tracing::debug!("Miss");
                None
            }
            Err(e) => {
                self.stats.record_storage_failure();
                self.stats.record_miss();
                tracing::warn!(error = %e, "Durable read failed; treating as miss");
                None
            }
        }
    }

    fn memory_hit(&self, key: &CacheKey) -> Option<CacheHit> {
        let entry = self.memory.get(key)?;
        self.stats.record_memory_hit();
        tracing::debug!("Memory hit");
        Some(CacheHit {
            entry,
            tier: Tier::Memory,
        })
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lookup(key).await.map(|hit| hit.entry)
    }

    /// Insert into memory, then write through to the durable store
    #[instrument(level = "debug", skip_all, fields(key = %key))]
    pub async fn put(&self, key: CacheKey, image: DecodedImage) -> PutOutcome {
        let entry = CacheEntry::new(key, image);
        let _guard = self.locks.lock(entry.key()).await;
        let admission = self.memory.insert(entry.clone());
        self.stats.record_evictions(admission.evicted.len());
        if !admission.admitted {
            tracing::debug!(
                weight = entry.weight(),
                budget = self.memory.budget(),
                "Entry exceeds memory budget; durable only"
            );
        }

        let persisted = match self.durable.store(entry.key(), entry.image()).await {
            Ok(()) => true,
            Err(e) => {
                self.stats.record_storage_failure();
                tracing::warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "Durable write-through failed"
                );
                false
            }
        };
        self.stats.record_write();

        PutOutcome {
            entry,
            memory_admitted: admission.admitted,
            evicted: admission.evicted,
            persisted,
        }
    }

    /// Remove `key` from both tiers; returns whether either held it
    #[instrument(level = "debug", skip_all, fields(key = %key))]
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let _guard = self.locks.lock(key).await;
        let in_memory = self.memory.remove(key).is_some();
        let in_durable = self.durable.remove(key).await?;
        self.stats.record_invalidation();
        Ok(in_memory || in_durable)
    }

    /// Drop every memory entry; the durable tier is untouched
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    pub fn contains_in_memory(&self, key: &CacheKey) -> bool {
        self.memory.contains(key)
    }

    /// Memory keys from least to most recently used
    pub fn recency_order(&self) -> Vec<CacheKey> {
        self.memory.recency_order()
    }

    pub fn memory_weight(&self) -> u64 {
        self.memory.weight()
    }

    pub fn memory_budget(&self) -> u64 {
        self.memory.budget()
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.stats.snapshot(self.memory.weight(), self.memory.len())
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}
