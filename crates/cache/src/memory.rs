//! Weight-bounded LRU memory tier
//!
//! All structural mutation (insert, promote, evict, remove) happens under a
//! single mutex, so the recency order and the weight total can never drift
//! apart. Lookups bump recency and therefore also take the lock.

use crate::entry::CacheEntry;
use lru::LruCache;
use lumen_core::CacheKey;
use parking_lot::Mutex;

/// Result of inserting into the memory tier
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Admission {
    /// False when the entry alone outweighs the budget
    pub admitted: bool,
    /// Keys pushed out to make room, least recently used first
    pub evicted: Vec<CacheKey>,
}

struct MemoryState {
    entries: LruCache<CacheKey, CacheEntry>,
    weight: u64,
}

/// In-memory tier bounded by total entry weight
pub struct MemoryTier {
    budget: u64,
    state: Mutex<MemoryState>,
}

impl MemoryTier {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                weight: 0,
            }),
        }
    }

    /// Look up an entry and mark it most recently used
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Look up an entry without touching recency
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().entries.peek(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Insert an entry, evicting least recently used entries until the
    /// budget holds again. The inserted entry is never its own victim.
    pub fn insert(&self, entry: CacheEntry) -> Admission {
        let mut state = self.state.lock();
        let key = entry.key().clone();
        let weight = entry.weight();

        if weight > self.budget {
            // Drop any stale copy so readers fall through to the durable tier
            if let Some(stale) = state.entries.pop(&key) {
                state.weight -= stale.weight();
            }
            return Admission {
                admitted: false,
                evicted: Vec::new(),
            };
        }

        if let Some(replaced) = state.entries.put(key, entry) {
            state.weight -= replaced.weight();
        }
        state.weight += weight;

        let mut evicted = Vec::new();
        while state.weight > self.budget && state.entries.len() > 1 {
            match state.entries.pop_lru() {
                Some((victim, victim_entry)) => {
                    state.weight -= victim_entry.weight();
                    evicted.push(victim);
                }
                None => break,
            }
        }

        Admission {
            admitted: true,
            evicted,
        }
    }

    pub fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        let removed = state.entries.pop(key);
        if let Some(entry) = &removed {
            state.weight -= entry.weight();
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.weight = 0;
    }

    /// Keys ordered from least to most recently used
    pub fn recency_order(&self) -> Vec<CacheKey> {
        self.state
            .lock()
            .entries
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Current total weight of resident entries
    pub fn weight(&self) -> u64 {
        self.state.lock().weight
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTier")
            .field("budget", &self.budget)
            .field("weight", &state.weight)
            .field("entries", &state.entries.len())
            .finish()
    }
}
