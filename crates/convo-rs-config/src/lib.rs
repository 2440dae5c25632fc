//! Configuration models and layered config loading.
//!
//! This crate owns the Convo config schema, validation, layer merging and
//! environment overrides used by the server and CLI.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Layered config types, loader options and environment variable names.
pub use loader::{
    ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions, env_vars,
};
/// Configuration schema models.
pub use model::*;
