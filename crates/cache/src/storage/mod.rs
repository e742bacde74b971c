//! Durable tier: decoded images persisted across process restarts
//!
//! The tiered cache only talks to [`DurableStore`]; [`DiskStore`] is the
//! filesystem implementation. Tests substitute failing or counting stores.

mod disk;
mod format;
mod paths;

pub use disk::{DiskStore, DurableUsage};
pub use format::{DurableCodec, StorageHeader, HEADER_SIZE, LUMEN_MAGIC, STORAGE_VERSION};
pub use paths::{entry_path, key_hash};

use async_trait::async_trait;
use lumen_core::{CacheKey, DecodedImage, Result};

/// Persistent key to image mapping
///
/// Implementations must make `store` atomic: a concurrent or later `load`
/// sees either the previous entry or the complete new one.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read an entry; `Ok(None)` when nothing usable is stored
    async fn load(&self, key: &CacheKey) -> Result<Option<DecodedImage>>;

    /// Write (or overwrite) an entry
    async fn store(&self, key: &CacheKey, image: &DecodedImage) -> Result<()>;

    /// Delete an entry; returns whether one existed
    async fn remove(&self, key: &CacheKey) -> Result<bool>;
}
