//! Classification helpers for lumen errors

use super::types::Error;

impl Error {
    /// Check if retrying the same operation may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StorageFailure { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Failures that end a load as an absence delivery instead of an error
    #[must_use]
    pub const fn is_absence(&self) -> bool {
        matches!(
            self,
            Self::DecodeFailure { .. }
                | Self::InvalidImage { .. }
                | Self::StorageFailure { .. }
                | Self::Serialization { .. }
                | Self::Corruption { .. }
        )
    }

    /// Programming errors that must surface immediately
    #[must_use]
    pub const fn is_defect(&self) -> bool {
        matches!(self, Self::PreconditionViolation { .. })
    }
}
