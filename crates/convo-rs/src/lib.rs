//! Public SDK surface for Convo.
//!
//! This crate re-exports the memory, config and server building blocks and
//! provides a small initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use convo_rs_config as config;
/// Re-export for convenience.
pub use convo_rs_memory as memory;
/// Re-export for convenience.
pub use convo_rs_server as server;

/// Initialize env_logger with millisecond timestamps, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}
