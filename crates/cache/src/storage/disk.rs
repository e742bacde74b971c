//! Filesystem-backed durable store

use super::format::DurableCodec;
use super::paths::entry_path;
use super::DurableStore;
use async_trait::async_trait;
use lumen_core::{CacheKey, DecodedImage, Error, LoaderConfig, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Space taken by the durable tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurableUsage {
    pub entries: u64,
    pub bytes: u64,
}

/// Durable tier rooted at a cache directory
///
/// Writes go to a uniquely named temp file beside the target and are then
/// renamed into place, so readers never observe a partial entry.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    codec: DurableCodec,
}

impl DiskStore {
    /// Open (creating if needed) a store under `root`
    pub async fn open(root: impl Into<PathBuf>, codec: DurableCodec) -> Result<Self> {
        let root = root.into();
        let objects = root.join("objects");
        fs::create_dir_all(&objects)
            .await
            .map_err(|e| Error::storage(objects, "create cache directory", e))?;

        tracing::debug!(root = %root.display(), ?codec, "Opened durable store");
        Ok(Self { root, codec })
    }

    pub async fn from_config(config: &LoaderConfig) -> Result<Self> {
        let codec = DurableCodec::new(config.compress_durable, config.compression_level);
        Self::open(&config.cache_dir, codec).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        entry_path(&self.root, key)
    }

    /// Walk the object directory and total up committed entries
    pub async fn usage(&self) -> Result<DurableUsage> {
        let objects = self.root.join("objects");
        let mut usage = DurableUsage::default();

        let mut shards = match fs::read_dir(&objects).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(usage),
            Err(e) => return Err(Error::storage(objects, "list cache directory", e)),
        };
        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| Error::storage(&objects, "list cache directory", e))?
        {
            let shard_path = shard.path();
            let is_dir = shard
                .file_type()
                .await
                .map(|kind| kind.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let mut files = fs::read_dir(&shard_path)
                .await
                .map_err(|e| Error::storage(&shard_path, "list cache shard", e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| Error::storage(&shard_path, "list cache shard", e))?
            {
                // In-progress writes
                if file.file_name().to_string_lossy().contains(".tmp.") {
                    continue;
                }
                let metadata = file
                    .metadata()
                    .await
                    .map_err(|e| Error::storage(file.path(), "stat cache file", e))?;
                if metadata.is_file() {
                    usage.entries += 1;
                    usage.bytes += metadata.len();
                }
            }
        }
        Ok(usage)
    }

    async fn discard_corrupt(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove corrupt entry"
                );
            }
        }
    }
}

#[async_trait]
impl DurableStore for DiskStore {
    #[instrument(level = "trace", skip_all, fields(key = %key))]
    async fn load(&self, key: &CacheKey) -> Result<Option<DecodedImage>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(path, "read cache file", e)),
        };

        match self.codec.decode(key, &bytes) {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                tracing::warn!(%key, error = %e, "Discarding unreadable durable entry");
                self.discard_corrupt(&path).await;
                Ok(None)
            }
        }
    }

    #[instrument(level = "trace", skip_all, fields(key = %key, bytes = image.byte_len()))]
    async fn store(&self, key: &CacheKey, image: &DecodedImage) -> Result<()> {
        let path = self.path_for(key);
        let bytes = self.codec.encode(key, image)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(parent, "create parent directory", e))?;
        }

        let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::storage(temp_path, "write cache file", e));
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::storage(path, "rename cache file", e));
        }

        tracing::trace!(%key, bytes = bytes.len(), "Stored durable entry");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(path, "remove cache file", e)),
        }
    }
}
