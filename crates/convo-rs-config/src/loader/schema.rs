//! Schema validation helpers for Convo JSON5 configuration.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
///
/// Partial layers only need well-typed keys; the effective config must also
/// carry positive limits.
pub(super) fn validate_layer_schema(
    value: &Value,
    mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(map, &["$schema", "memory", "server", "sweep"], layer, "")?;

    if let Some(value) = field(map, "$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = field(map, "memory") {
        validate_memory(value, mode, layer, "memory")?;
    }
    if let Some(value) = field(map, "server") {
        validate_server(value, layer, "server")?;
    }
    if let Some(value) = field(map, "sweep") {
        validate_sweep(value, layer, "sweep")?;
    }
    Ok(())
}

/// Validate the "memory" block.
fn validate_memory(
    value: &Value,
    mode: SchemaMode,
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "path",
            "max_messages_per_user",
            "max_context_messages",
            "expire_days",
            "io_timeout_secs",
        ],
        layer,
        path,
    )?;

    if let Some(value) = field(map, "path") {
        expect_string(value, layer, &join_path(path, "path"))?;
    }
    for key in [
        "max_messages_per_user",
        "max_context_messages",
        "expire_days",
        "io_timeout_secs",
    ] {
        let Some(value) = field(map, key) else {
            continue;
        };
        let key_path = join_path(path, key);
        let number = expect_u64(value, layer, &key_path)?;
        if matches!(mode, SchemaMode::Full) && number == 0 {
            return Err(invalid_field(layer, &key_path, "must be at least 1"));
        }
    }
    if let Some(value) = field(map, "expire_days") {
        let days = expect_u64(value, layer, &join_path(path, "expire_days"))?;
        if u32::try_from(days).is_err() {
            return Err(invalid_field(
                layer,
                &join_path(path, "expire_days"),
                "out of range",
            ));
        }
    }
    Ok(())
}

/// Validate the "server" block.
fn validate_server(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["host", "port"], layer, path)?;

    if let Some(value) = field(map, "host") {
        expect_string(value, layer, &join_path(path, "host"))?;
    }
    if let Some(value) = field(map, "port") {
        let port_path = join_path(path, "port");
        let port = expect_u64(value, layer, &port_path)?;
        if u16::try_from(port).is_err() {
            return Err(invalid_field(layer, &port_path, "expected port number"));
        }
    }
    Ok(())
}

/// Validate the "sweep" block.
fn validate_sweep(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["interval_secs"], layer, path)?;

    if let Some(value) = field(map, "interval_secs") {
        expect_u64(value, layer, &join_path(path, "interval_secs"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
/// Look up a key, treating an explicit `null` as absent.
fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a non-negative JSON integer or return a typed error.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<u64, ConfigError> {
    value
        .as_u64()
        .ok_or_else(|| invalid_field(layer, path, "expected non-negative integer"))
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
