//! Retention and context limits applied by the memory manager.

use std::time::Duration;

/// Default cap on retained turns per user.
pub const DEFAULT_MAX_MESSAGES_PER_USER: usize = 50;
/// Default number of turns projected into a context window.
pub const DEFAULT_MAX_CONTEXT_MESSAGES: usize = 10;
/// Default inactivity window before a user is purged.
pub const DEFAULT_EXPIRE_DAYS: u32 = 30;
/// Default bound on a single backend call.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Limits enforced by [`crate::MemoryManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    /// Max turns kept per user; older turns are evicted first.
    pub max_messages_per_user: usize,
    /// Max turns returned in a context window (excluding the system entry).
    pub max_context_messages: usize,
    /// Users inactive for longer than this are purged by the expiry sweep.
    pub expire_days: u32,
    /// Bound on every backend load/save/delete/list call.
    pub io_timeout: Duration,
}

impl Default for MemoryLimits {
    /// Default limits.
    fn default() -> Self {
        Self {
            max_messages_per_user: DEFAULT_MAX_MESSAGES_PER_USER,
            max_context_messages: DEFAULT_MAX_CONTEXT_MESSAGES,
            expire_days: DEFAULT_EXPIRE_DAYS,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}
