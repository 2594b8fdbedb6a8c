//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If `~/.pushbridge/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PUSHBRIDGE_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{BridgeSettings, MAX_CHANNEL_CAPACITY};

/// Resolve the path to the settings file (`~/.pushbridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pushbridge").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BridgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (file/default value wins).
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Split out so tests can feed a map instead of mutating the process env.
pub fn apply_overrides(settings: &mut BridgeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("PUSHBRIDGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("PUSHBRIDGE_LOG_JSON").and_then(|v| parsed("PUSHBRIDGE_LOG_JSON", &v, parse_bool(&v))) {
        settings.logging.json = v;
    }
    if let Some(v) = read("PUSHBRIDGE_HOST_CHANNEL_CAPACITY").and_then(|v| {
        parsed(
            "PUSHBRIDGE_HOST_CHANNEL_CAPACITY",
            &v,
            parse_usize_range(&v, 1, MAX_CHANNEL_CAPACITY),
        )
    }) {
        settings.host.channel_capacity = v;
    }
    if let Some(v) = read("PUSHBRIDGE_RETAIN_UNTIL_CONSUMED")
        .and_then(|v| parsed("PUSHBRIDGE_RETAIN_UNTIL_CONSUMED", &v, parse_bool(&v)))
    {
        settings.host.retain_until_consumed = v;
    }
    if let Some(v) = read("PUSHBRIDGE_AUTO_INIT").and_then(|v| parsed("PUSHBRIDGE_AUTO_INIT", &v, parse_bool(&v))) {
        settings.registration.auto_init = v;
    }
}

fn parsed<T>(key: &str, raw: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        tracing::warn!(key, value = %raw, "invalid env var, ignoring");
    }
    value
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
