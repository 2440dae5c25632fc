//! Per-user conversation memory for Convo.
//!
//! A bounded, durable store of chat turns with per-user write serialization,
//! oldest-first eviction, inactivity expiry and context-window projection.

pub mod backend;
pub mod context;
pub mod error;
mod locks;
pub mod manager;
pub mod model;
pub mod policy;

/// Persistence backend interface and default file implementation.
pub use backend::{FileMemoryBackend, MemoryBackend};
/// Context window projection.
pub use context::{ContextMessage, ContextRole, build_context, system_prompt};
/// Memory error type.
pub use error::MemoryError;
/// Memory manager facade.
pub use manager::{MemoryManager, SweepReport};
/// Record and stats models.
pub use model::{ChatMessage, MessageType, Role, UserMemory, UserStats};
/// Retention and context limits.
pub use policy::MemoryLimits;
