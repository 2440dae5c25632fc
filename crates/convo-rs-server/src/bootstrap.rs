//! Wiring from loaded configuration to a ready memory manager.

use anyhow::Context;
use convo_rs_config::{ConvoConfig, MemoryConfig};
use convo_rs_memory::{FileMemoryBackend, MemoryLimits, MemoryManager};
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Translate the memory section of the config into manager limits.
pub fn limits_from_config(memory: &MemoryConfig) -> MemoryLimits {
    MemoryLimits {
        max_messages_per_user: memory.max_messages_per_user,
        max_context_messages: memory.max_context_messages,
        expire_days: memory.expire_days,
        io_timeout: Duration::from_secs(memory.io_timeout_secs),
    }
}

/// Open the file backend at the configured path and build a manager over it.
pub fn manager_from_config(config: &ConvoConfig) -> anyhow::Result<Arc<MemoryManager>> {
    let backend = FileMemoryBackend::new(&config.memory.path)
        .with_context(|| format!("failed to open memory directory {}", config.memory.path))?;
    let limits = limits_from_config(&config.memory);
    info!(
        "memory manager ready (path={}, max_messages={}, max_context={}, expire_days={})",
        config.memory.path,
        limits.max_messages_per_user,
        limits.max_context_messages,
        limits.expire_days
    );
    Ok(Arc::new(MemoryManager::new(Arc::new(backend), limits)))
}
