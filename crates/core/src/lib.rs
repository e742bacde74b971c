//! Core domain types, errors, and configuration for `lumen`.
//!
//! Everything the cache and loader crates agree on lives here so that the
//! two can evolve independently:
//!
//! - **`errors`**: the `Error` enum and `Result` alias shared by every crate,
//!   covering decode, storage, and precondition failures.
//! - **`types`**: resource locators, cache keys, and the decoded image buffer.
//! - **`config`**: `LoaderConfig`, its builder, and environment overrides.
//! - **`constants`**: environment variable names and defaults.

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    config::{ConfigSource, LoaderConfig, LoaderConfigBuilder},
    constants::*,
    errors::{Error, Result, SerializationOp},
    types::*,
};
