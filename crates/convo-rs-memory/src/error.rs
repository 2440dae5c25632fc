//! Error types for memory operations.

use std::time::Duration;

/// Errors returned by memory backends and the memory manager.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Input rejected before any backend I/O.
    #[error("validation error: {0}")]
    Validation(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A backend call exceeded the configured timeout.
    #[error("backend operation timed out after {0:?}")]
    Timeout(Duration),
    /// A blocking backend task panicked or was cancelled.
    #[error("backend task failed: {0}")]
    Join(String),
}

impl MemoryError {
    /// Build a validation error from a message.
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_) | Self::Join(_))
    }
}
