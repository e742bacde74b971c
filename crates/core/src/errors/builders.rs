//! Builder methods for creating errors with context

use super::types::{Error, SerializationOp};
use std::path::PathBuf;

impl Error {
    /// Create a decode failure for a locator
    #[must_use]
    pub fn decode_failure(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DecodeFailure {
            locator: locator.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a decode failure carrying the underlying decoder error
    #[must_use]
    pub fn decode_failure_with_source(
        locator: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::DecodeFailure {
            locator: locator.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an invalid image error
    #[must_use]
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Error::InvalidImage {
            message: message.into(),
        }
    }

    /// Create a storage failure with path context
    #[must_use]
    pub fn storage(
        path: impl Into<PathBuf>,
        operation: &'static str,
        source: std::io::Error,
    ) -> Self {
        Error::StorageFailure {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(
        key: impl Into<String>,
        operation: SerializationOp,
        message: impl Into<String>,
    ) -> Self {
        Error::Serialization {
            key: key.into(),
            operation,
            message: message.into(),
        }
    }

    /// Create a corruption error
    #[must_use]
    pub fn corruption(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Corruption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a cancellation marker
    #[must_use]
    pub fn cancelled(key: impl Into<String>) -> Self {
        Error::Cancelled { key: key.into() }
    }

    /// Create a precondition violation
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::PreconditionViolation {
            message: message.into(),
        }
    }
}
