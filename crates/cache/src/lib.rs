//! Two-tier image cache for lumen
//!
//! - **Key derivation**: locators are canonicalized and hashed into
//!   [`CacheKey`](lumen_core::CacheKey)s
//! - **Memory tier**: weight-bounded LRU of decoded images
//! - **Durable tier**: checksummed, optionally compressed files in a sharded
//!   object directory
//! - **Tiered cache**: memory in front of durable, with write-through and
//!   promotion on durable hits
//! - **Retainer**: host-owned slot that keeps one cache alive across
//!   container re-creation

pub mod entry;
pub mod keys;
mod locks;
pub mod memory;
pub mod retained;
pub mod stats;
pub mod storage;
pub mod tiered;

pub use entry::CacheEntry;
pub use keys::{canonical_form, derive_key, CacheKeyDeriver};
pub use memory::{Admission, MemoryTier};
pub use retained::{retained_cache, InMemoryRetainer, RetainedObject, Retainer};
pub use stats::{CacheStatistics, CacheStats};
pub use storage::{DiskStore, DurableCodec, DurableStore, DurableUsage};
pub use tiered::{CacheHit, PutOutcome, Tier, TieredCache};
