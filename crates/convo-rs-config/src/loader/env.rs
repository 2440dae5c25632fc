//! Environment variable overrides, applied above every file layer.

use crate::ConfigError;
use log::debug;
use serde_json::{Map, Value};

/// Names of the environment variables read by the loader.
pub mod env_vars {
    pub const MAX_MESSAGES_PER_USER: &str = "MAX_MESSAGES_PER_USER";
    pub const MAX_CONTEXT_MESSAGES: &str = "MAX_CONTEXT_MESSAGES";
    pub const MEMORY_EXPIRE_DAYS: &str = "MEMORY_EXPIRE_DAYS";
    pub const MEMORY_DATA_DIR: &str = "MEMORY_DATA_DIR";
    pub const MEMORY_IO_TIMEOUT_SECS: &str = "MEMORY_IO_TIMEOUT_SECS";
    pub const MEMORY_SWEEP_INTERVAL_SECS: &str = "MEMORY_SWEEP_INTERVAL_SECS";
    pub const MEMORY_SERVICE_HOST: &str = "MEMORY_SERVICE_HOST";
    pub const MEMORY_SERVICE_PORT: &str = "MEMORY_SERVICE_PORT";
}

#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Text,
    Count,
    Port,
}

/// (variable, section, key, kind)
const OVERRIDES: &[(&str, &str, &str, EnvKind)] = &[
    (env_vars::MAX_MESSAGES_PER_USER, "memory", "max_messages_per_user", EnvKind::Count),
    (env_vars::MAX_CONTEXT_MESSAGES, "memory", "max_context_messages", EnvKind::Count),
    (env_vars::MEMORY_EXPIRE_DAYS, "memory", "expire_days", EnvKind::Count),
    (env_vars::MEMORY_DATA_DIR, "memory", "path", EnvKind::Text),
    (env_vars::MEMORY_IO_TIMEOUT_SECS, "memory", "io_timeout_secs", EnvKind::Count),
    (env_vars::MEMORY_SWEEP_INTERVAL_SECS, "sweep", "interval_secs", EnvKind::Count),
    (env_vars::MEMORY_SERVICE_HOST, "server", "host", EnvKind::Text),
    (env_vars::MEMORY_SERVICE_PORT, "server", "port", EnvKind::Port),
];

/// Build an overlay from the variables `lookup` resolves, or `None` when
/// none are set.
pub(super) fn env_overlay(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<Value>, ConfigError> {
    let mut root = Map::new();
    for &(name, section, key, kind) in OVERRIDES {
        let Some(raw) = lookup(name) else {
            continue;
        };
        let value = parse_value(name, &raw, kind)?;
        debug!("environment override {name} -> {section}.{key}");
        let entry = root
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(section_map) = entry {
            section_map.insert(key.to_string(), value);
        }
    }
    if root.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Value::Object(root)))
    }
}

fn parse_value(name: &str, raw: &str, kind: EnvKind) -> Result<Value, ConfigError> {
    let trimmed = raw.trim();
    let invalid = |message: &str| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: raw.to_string(),
        message: message.to_string(),
    };
    match kind {
        EnvKind::Text if trimmed.is_empty() => Err(invalid("must not be empty")),
        EnvKind::Text => Ok(Value::String(trimmed.to_string())),
        EnvKind::Count => trimmed
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| invalid("expected non-negative integer")),
        EnvKind::Port => trimmed
            .parse::<u16>()
            .map(Value::from)
            .map_err(|_| invalid("expected port number")),
    }
}
