//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GqlWsSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `GQLWS_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::GqlWsSettings;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_ENV: &str = "GQLWS_SETTINGS";

/// Resolve the settings file: `$GQLWS_SETTINGS`, else `./gqlws.json`.
pub fn settings_path() -> PathBuf {
    std::env::var(SETTINGS_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("gqlws.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GqlWsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<GqlWsSettings> {
    let defaults = serde_json::to_value(GqlWsSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: GqlWsSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
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

/// Apply `GQLWS_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut GqlWsSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is kept.
pub fn apply_overrides(settings: &mut GqlWsSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("GQLWS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("GQLWS_PORT", |s| parse_u16_range(s, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("GQLWS_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.parsed("GQLWS_MAX_MESSAGE_SIZE", |s| {
        parse_usize_range(s, 1024, 1_073_741_824)
    }) {
        settings.server.max_message_size = v;
    }

    // ── Protocol ────────────────────────────────────────────────────
    if let Some(v) = env.parsed("GQLWS_REQUIRE_INIT", parse_bool) {
        settings.protocol.require_connection_init = v;
    }
    if let Some(v) = env.parsed("GQLWS_KEEP_ALIVE_MS", |s| parse_u64_range(s, 0, 3_600_000)) {
        settings.protocol.keep_alive_interval_ms = v;
    }
    if let Some(v) = env.parsed("GQLWS_MAX_OPERATIONS", |s| {
        parse_usize_range(s, 0, 1_000_000)
    }) {
        settings.protocol.max_operations_per_connection = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("GQLWS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("GQLWS_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
