//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every section has `#[serde(default)]`
//! so partial files only override what they mention.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::loader::lifeos_dir;

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifeOsSettings {
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    pub router: RouterSettings,
    pub loader: LoaderSettings,
    pub modules: ModuleSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file holding the durable key-value store.
    pub db_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: lifeos_dir().join("lifeos.db").to_string_lossy().into_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` still wins.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target overrides, e.g. `{"lifeos_store": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterSettings {
    pub default_tab: String,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_tab: "inicio".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderSettings {
    /// Wait after a load completes before checking the module is exposed.
    pub settle_delay_ms: u64,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
        }
    }
}

/// Overrides for the module layout. `None` keeps the built-in table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabs: Option<Vec<TabModules>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabModules {
    pub tab: String,
    pub modules: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = LifeOsSettings::default();
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.json);
        assert_eq!(s.router.default_tab, "inicio");
        assert_eq!(s.loader.settle_delay_ms, 100);
        assert!(s.storage.db_path.ends_with("lifeos.db"));
        assert!(s.modules.init_order.is_none());
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(LifeOsSettings::default()).unwrap();
        assert!(json["storage"].get("dbPath").is_some());
        assert!(json["loader"].get("settleDelayMs").is_some());
        assert!(json["modules"].get("initOrder").is_none());
    }

    #[test]
    fn tab_modules_parse() {
        let parsed: ModuleSettings = serde_json::from_str(
            r#"{"tabs": [{"tab": "inicio", "modules": ["tasks"]}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.tabs.unwrap(),
            vec![TabModules {
                tab: "inicio".into(),
                modules: vec!["tasks".into()],
            }]
        );
    }
}
