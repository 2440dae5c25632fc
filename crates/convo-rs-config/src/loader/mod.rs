//! Layered configuration loader with environment overrides.
//!
//! Discovers configuration layers (user, cwd, runtime), validates schema,
//! merges them, applies environment overrides and produces a final
//! `ConvoConfig`.

mod env;
mod layer_io;
mod merge;
mod schema;


pub use env::env_vars;

use crate::{ConfigError, ConvoConfig};
use log::{debug, info};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "convo.json5";
/// Default config directory under the user's home.
const DEFAULT_CONFIG_DIR: &str = ".convo";

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: ConvoConfig,
    /// Metadata for each layer applied during load.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// User-specific configuration.
    User,
    /// Current working directory configuration.
    Cwd,
    /// Explicit override files.
    Runtime,
    /// Environment variables (highest precedence).
    Environment,
}

/// Metadata about a config layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    /// Layer origin.
    pub source: ConfigLayerSource,
    /// Location on disk, if the layer is a file.
    pub path: Option<PathBuf>,
}

/// Schema validation mode for layered configs.
#[derive(Debug, Clone, Copy)]
enum SchemaMode {
    /// Partial validation for non-final layers.
    Partial,
    /// Full validation for the effective config.
    Full,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to find the cwd layer.
    pub cwd: PathBuf,
    /// Optional user config path (defaults to `~/.convo/convo.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Runtime override config paths applied after file layers.
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    /// Add a runtime override config path that is applied after file layers.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Replace or disable the user config path.
    pub fn with_user_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.user_config_path = path;
        self
    }
}

impl ConvoConfig {
    /// Load a single config from a path (no layering, no environment).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        let value: Value = json5::from_str(&contents)?;
        config_from_value(value, "config")
    }

    /// Load a single config from JSON5 contents (no layering, no environment).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Load the layered stack from default locations plus process environment.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        info!(
            "loading layered config with defaults (cwd={})",
            cwd.as_ref().display()
        );
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load the layered stack with explicit locations plus process environment.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_env(options, |name| std::env::var(name).ok())
    }

    /// Load the layered stack resolving environment overrides via `lookup`.
    ///
    /// Layer precedence (low -> high): user, cwd, runtime overrides, environment.
    pub fn load_layered_with_env(
        options: LayeredConfigOptions,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut layers = Vec::new();
        let mut merged = Value::Object(serde_json::Map::new());
        for candidate in layer_io::layer_candidates(&options)? {
            let Some(loaded) = layer_io::read_layer(&candidate)? else {
                continue;
            };
            merge::merge_json_values(&mut merged, &loaded.value);
            layers.push(loaded.meta);
        }

        if let Some(overlay) = env::env_overlay(lookup)? {
            debug!("applying environment overrides");
            merge::merge_json_values(&mut merged, &overlay);
            layers.push(ConfigLayer {
                source: ConfigLayerSource::Environment,
                path: None,
            });
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let memory = &self.memory;
        if memory.path.trim().is_empty() {
            return Err(invalid("memory.path", "must not be empty"));
        }
        if memory.max_messages_per_user == 0 {
            return Err(invalid("memory.max_messages_per_user", "must be at least 1"));
        }
        if memory.max_context_messages == 0 {
            return Err(invalid("memory.max_context_messages", "must be at least 1"));
        }
        if memory.expire_days == 0 {
            return Err(invalid("memory.expire_days", "must be at least 1"));
        }
        if memory.io_timeout_secs == 0 {
            return Err(invalid("memory.io_timeout_secs", "must be at least 1"));
        }
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host", "must not be empty"));
        }
        Ok(())
    }
}

/// Internal representation of a loaded config layer.
#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

fn config_from_value(mut value: Value, label: &str) -> Result<ConvoConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    merge::strip_nulls(&mut value);
    let config: ConvoConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

fn invalid(path: &str, message: &str) -> ConfigError {
    ConfigError::InvalidField {
        path: path.to_string(),
        message: message.to_string(),
    }
}
