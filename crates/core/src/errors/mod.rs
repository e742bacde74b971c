//! Error types shared by the lumen crates

mod builders;
mod recovery;
mod types;

pub use types::{Error, Result, SerializationOp};
