//! Core error type definitions

use std::path::PathBuf;

/// Result type alias for lumen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Direction of a (de)serialization step on a durable entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationOp {
    Encode,
    Decode,
    Compress,
    Decompress,
}

/// Core error type for lumen operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source could not be read or its bytes are not a decodable image
    #[error("failed to decode '{locator}': {message}")]
    DecodeFailure {
        locator: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A decoder produced a buffer inconsistent with its declared geometry
    #[error("invalid image buffer: {message}")]
    InvalidImage { message: String },

    /// Durable tier read or write failure
    #[error("storage failure during {operation} on '{}': {source}", path.display())]
    StorageFailure {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A durable entry could not be encoded or decoded
    #[error("failed to {operation:?} cache entry '{key}': {message}")]
    Serialization {
        key: String,
        operation: SerializationOp,
        message: String,
    },

    /// A durable entry failed its integrity checks
    #[error("corrupt cache entry '{key}': {reason}")]
    Corruption { key: String, reason: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Every receiver detached before delivery
    #[error("load of '{key}' was cancelled")]
    Cancelled { key: String },

    /// API misuse: a caller broke a documented precondition
    #[error("precondition violated: {message}")]
    PreconditionViolation { message: String },
}
