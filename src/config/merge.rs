//! Layer merge logic
//!
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::{Map, Value};

use super::effective::ConfigError;

/// Deep merge `overlay` onto `base`.
///
/// Null in the overlay overrides any value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Parse a `--set dotted.key=value` override into a nested object.
///
/// The value is read as a JSON literal when it parses as one (`3`, `true`,
/// `"x"`), otherwise it is taken as a bare string.
pub fn parse_override(assignment: &str) -> Result<Value, ConfigError> {
    let (path, raw) = assignment.split_once('=').ok_or_else(|| {
        ConfigError::ParseError(format!("override '{}' is not of the form key=value", assignment))
    })?;
    let path = path.trim();
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(ConfigError::ParseError(format!(
            "override '{}' has an empty key",
            assignment
        )));
    }

    let leaf = serde_json::from_str::<Value>(raw.trim())
        .unwrap_or_else(|_| Value::String(raw.trim().to_string()));

    Ok(path.rsplit('.').fold(leaf, |inner, key| {
        let mut map = Map::new();
        map.insert(key.to_string(), inner);
        Value::Object(map)
    }))
}
