//! Configuration schema for Convo.

use serde::{Deserialize, Serialize};

/// Root config for the Convo memory service.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConvoConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl ConvoConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ConvoConfigBuilder {
        ConvoConfigBuilder::new()
    }
}

/// Builder for assembling a `ConvoConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ConvoConfigBuilder {
    config: ConvoConfig,
}

impl ConvoConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ConvoConfig::default(),
        }
    }

    /// Replace the memory configuration.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Replace the HTTP server configuration.
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Replace the expiry sweep configuration.
    pub fn sweep(mut self, sweep: SweepConfig) -> Self {
        self.config.sweep = sweep;
        self
    }

    /// Finalize and return the built `ConvoConfig`.
    pub fn build(self) -> ConvoConfig {
        self.config
    }
}

/// Storage location and retention limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Directory holding one record per user.
    #[serde(default = "default_memory_path")]
    pub path: String,
    #[serde(default = "default_max_messages_per_user")]
    pub max_messages_per_user: usize,
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
    #[serde(default = "default_expire_days")]
    pub expire_days: u32,
    /// Bound on each storage call, in seconds.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
            max_messages_per_user: default_max_messages_per_user(),
            max_context_messages: default_max_context_messages(),
            expire_days: default_expire_days(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

fn default_memory_path() -> String {
    "memory_data".to_string()
}

fn default_max_messages_per_user() -> usize {
    50
}

fn default_max_context_messages() -> usize {
    10
}

fn default_expire_days() -> u32 {
    30
}

fn default_io_timeout_secs() -> u64 {
    10
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8004
}

/// Background expiry sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepConfig {
    /// Seconds between sweeps; `0` disables the background sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    3600
}
