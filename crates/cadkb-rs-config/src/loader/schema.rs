//! Schema validation helpers for knowledge store JSON5 configuration.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(
    value: &Value,
    _mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &["$schema", "store", "embedding", "recall", "analysis"],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("store") {
        validate_store(value, layer, "store")?;
    }
    if let Some(value) = map.get("embedding") {
        validate_embedding(value, layer, "embedding")?;
    }
    if let Some(value) = map.get("recall") {
        validate_recall(value, layer, "recall")?;
    }
    if let Some(value) = map.get("analysis") {
        let map = expect_object(value, layer, "analysis")?;
        ensure_allowed_keys(map, &["top_tags"], layer, "analysis")?;
        if let Some(value) = map.get("top_tags") {
            expect_u64(value, layer, "analysis.top_tags")?;
        }
    }
    Ok(())
}

/// Validate the "store" block.
fn validate_store(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["path", "busy_timeout_ms"], layer, path)?;
    if let Some(value) = map.get("path") {
        expect_optional_string(value, layer, &join_path(path, "path"))?;
    }
    if let Some(value) = map.get("busy_timeout_ms") {
        expect_u64(value, layer, &join_path(path, "busy_timeout_ms"))?;
    }
    Ok(())
}

/// Validate the "embedding" block.
fn validate_embedding(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["provider", "dimension", "timeout_ms", "endpoint", "model"],
        layer,
        path,
    )?;
    if let Some(value) = map.get("provider") {
        let provider_path = join_path(path, "provider");
        let Some(provider) = value.as_str() else {
            return Err(invalid_field(layer, &provider_path, "expected string"));
        };
        if !matches!(provider, "hashing" | "http") {
            return Err(invalid_field(
                layer,
                &provider_path,
                "expected one of: hashing, http",
            ));
        }
    }
    if let Some(value) = map.get("dimension") {
        expect_u64(value, layer, &join_path(path, "dimension"))?;
    }
    if let Some(value) = map.get("timeout_ms") {
        expect_u64(value, layer, &join_path(path, "timeout_ms"))?;
    }
    for key in ["endpoint", "model"] {
        if let Some(value) = map.get(key) {
            expect_optional_string(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate the "recall" block.
fn validate_recall(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["default_results", "min_score"], layer, path)?;
    if let Some(value) = map.get("default_results") {
        expect_u64(value, layer, &join_path(path, "default_results"))?;
    }
    if let Some(value) = map.get("min_score")
        && !value.is_null()
    {
        expect_f64(value, layer, &join_path(path, "min_score"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
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

/// Expect a JSON string or null.
fn expect_optional_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_null() {
        return Ok(());
    }
    expect_string(value, layer, path)
}

/// Expect a non-negative JSON integer.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect a JSON number.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
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
