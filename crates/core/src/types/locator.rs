//! Resource locators and the cache keys derived from them

use crate::constants::INVALID_LOCATOR_KEY;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::ops::Deref;
use std::path::Path;

/// Identifier of an image resource, usually a URI or a filesystem path
///
/// A locator is kept verbatim; canonicalization happens when a cache key is
/// derived from it, so two differently spelled locators may share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&Path> for Locator {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

/// Canonical key used by both cache tiers and the in-flight registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-canonical key string
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a 128-bit digest, rendered as 32 lowercase hex digits
    pub fn from_digest(digest: u128) -> Self {
        Self(format!("{digest:032x}"))
    }

    /// Sentinel shared by every locator that cannot be canonicalized
    pub fn invalid() -> Self {
        Self(INVALID_LOCATOR_KEY.to_string())
    }

    pub fn is_invalid(&self) -> bool {
        self.0 == INVALID_LOCATOR_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for CacheKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
