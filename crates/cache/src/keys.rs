//! Cache key derivation from resource locators
//!
//! A key is the 128-bit xxh3 digest of the locator's canonical form, so
//! equal locators always share a key and differently spelled references to
//! the same resource (`/a/./b.png`, `file:///a/b.png`) usually do too.
//!
//! Canonical forms:
//! - absolute URLs are normalized by the URL parser (scheme and host case,
//!   default ports, dot segments, percent-encoding);
//! - anything else is treated as a filesystem path: `\` becomes `/`, empty
//!   and `.` segments are dropped, and the result is prefixed with `file://`.
//!
//! Locators that are empty, whitespace only, contain control characters, or
//! reduce to an empty path derive [`CacheKey::invalid`].

use lumen_core::{CacheKey, Locator};
use url::Url;
use xxhash_rust::xxh3::xxh3_128;

/// Derives cache keys from locators
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyDeriver;

impl CacheKeyDeriver {
    pub fn new() -> Self {
        Self
    }

    /// Derive the cache key for a locator; never fails
    pub fn derive(&self, locator: &Locator) -> CacheKey {
        derive_key(locator)
    }
}

/// Free-function form of [`CacheKeyDeriver::derive`]
pub fn derive_key(locator: &Locator) -> CacheKey {
    match canonical_form(locator.as_str()) {
        Some(canonical) => CacheKey::from_digest(xxh3_128(canonical.as_bytes())),
        None => CacheKey::invalid(),
    }
}

/// Canonical string for a raw locator, or `None` when it is malformed
pub fn canonical_form(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return None;
    }

    // Single-letter schemes are Windows drive letters, not URLs
    if let Ok(url) = Url::parse(trimmed) {
        if url.scheme().len() > 1 {
            return Some(url.to_string());
        }
    }

    normalize_path(trimmed).map(|path| format!("file://{path}"))
}

fn normalize_path(raw: &str) -> Option<String> {
    let unified = raw.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let segments: Vec<&str> = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    if segments.is_empty() {
        return None;
    }

    let joined = segments.join("/");
    Some(if absolute { format!("/{joined}") } else { joined })
}
