//! Test helpers shared across Convo crates.

pub mod memory;

pub use memory::{FailingBackend, InMemoryBackend, SlowBackend};
