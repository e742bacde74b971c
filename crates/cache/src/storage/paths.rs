//! On-disk layout of durable entries

use lumen_core::CacheKey;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Bumped whenever the meaning of a stored key changes
const KEY_NAMESPACE: &str = "lumen-durable-v1";

/// Hash a cache key into a filesystem-safe name
pub fn key_hash(key: &CacheKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(KEY_NAMESPACE.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `<root>/objects/<first two hex chars>/<hash>`
pub fn entry_path(root: &Path, key: &CacheKey) -> PathBuf {
    let hash = key_hash(key);
    root.join("objects").join(&hash[..2]).join(hash)
}
