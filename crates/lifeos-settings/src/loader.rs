//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LifeOsSettings::default()`]
//! 2. If `~/.lifeos/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `LIFEOS_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use lifeos_core::json::deep_merge;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::LifeOsSettings;

/// `~/.lifeos`, or `/tmp/.lifeos` when `HOME` is unset.
pub fn lifeos_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lifeos")
}

/// Resolve the path to the settings file (`~/.lifeos/settings.json`).
pub fn settings_path() -> PathBuf {
    lifeos_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LifeOsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LifeOsSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<LifeOsSettings> {
    let defaults = serde_json::to_value(LifeOsSettings::default())?;

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

/// Apply environment overrides. `lookup` abstracts `std::env::var` so
/// tests do not mutate the process environment.
pub fn apply_env_overrides<F>(settings: &mut LifeOsSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = read_env_string(&lookup, "LIFEOS_DB_PATH") {
        settings.storage.db_path = path;
    }
    if let Some(level) = read_env_string(&lookup, "LIFEOS_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(json) = read_env_bool(&lookup, "LIFEOS_LOG_JSON") {
        settings.logging.json = json;
    }
    if let Some(tab) = read_env_string(&lookup, "LIFEOS_DEFAULT_TAB") {
        settings.router.default_tab = tab;
    }
    if let Some(ms) = read_env_u64_range(&lookup, "LIFEOS_SETTLE_DELAY_MS", 0, 60_000) {
        settings.loader.settle_delay_ms = ms;
    }
}

fn read_env_string<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_bool<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<bool> {
    let raw = lookup(name)?;
    let parsed = parse_bool(&raw);
    if parsed.is_none() {
        warn!(var = name, value = %raw, "ignoring invalid boolean env override");
    }
    parsed
}

fn read_env_u64_range<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let raw = lookup(name)?;
    let parsed = parse_u64_range(&raw, min, max);
    if parsed.is_none() {
        warn!(var = name, value = %raw, min, max, "ignoring out-of-range env override");
    }
    parsed
}

/// Parse a boolean from common string representations.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` within an inclusive range.
pub fn parse_u64_range(value: &str, min: u64, max: u64) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("100", 0, 1000), Some(100));
        assert_eq!(parse_u64_range("0", 0, 1000), Some(0));
        assert_eq!(parse_u64_range("1001", 0, 1000), None);
        assert_eq!(parse_u64_range("-5", 0, 1000), None);
        assert_eq!(parse_u64_range("abc", 0, 1000), None);
    }

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file_layer(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.router.default_tab, "inicio");
        assert_eq!(settings.loader.settle_delay_ms, 100);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"logging": {"level": "debug"}, "loader": {"settleDelayMs": 5}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.logging.level, "debug");
        assert!(!settings.logging.json);
        assert_eq!(settings.loader.settle_delay_ms, 5);
        assert_eq!(settings.router.default_tab, "inicio");
    }

    #[test]
    fn null_in_file_keeps_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"router": {"defaultTab": null}}"#).unwrap();
        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.router.default_tab, "inicio");
    }

    #[test]
    fn module_layout_override_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"modules": {"initOrder": ["tasks"], "tabs": [{"tab": "inicio", "modules": ["tasks"]}]}}"#,
        )
        .unwrap();
        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.modules.init_order, Some(vec!["tasks".to_string()]));
        assert_eq!(settings.modules.tabs.map(|t| t.len()), Some(1));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_file_layer(&path).unwrap_err();
        assert!(matches!(err, crate::SettingsError::Json(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = LifeOsSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("LIFEOS_DB_PATH", "/data/life.db"),
                ("LIFEOS_LOG_LEVEL", "trace"),
                ("LIFEOS_LOG_JSON", "1"),
                ("LIFEOS_DEFAULT_TAB", "metas"),
                ("LIFEOS_SETTLE_DELAY_MS", "0"),
            ]),
        );
        assert_eq!(settings.storage.db_path, "/data/life.db");
        assert_eq!(settings.logging.level, "trace");
        assert!(settings.logging.json);
        assert_eq!(settings.router.default_tab, "metas");
        assert_eq!(settings.loader.settle_delay_ms, 0);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut settings = LifeOsSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("LIFEOS_LOG_JSON", "sometimes"),
                ("LIFEOS_SETTLE_DELAY_MS", "forever"),
                ("LIFEOS_DEFAULT_TAB", "   "),
            ]),
        );
        assert!(!settings.logging.json);
        assert_eq!(settings.loader.settle_delay_ms, 100);
        assert_eq!(settings.router.default_tab, "inicio");
    }
}
