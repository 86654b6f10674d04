//! Durable key names and the hydration table.

/// Prefix of individually namespaced state keys.
pub const STATE_PREFIX: &str = "lifeOS_";

/// Consolidated blob written by the single-key persistence scheme.
pub const CONSOLIDATED_KEY: &str = "lifeOSState";

/// Current-format key for the active tab.
pub const CURRENT_TAB_KEY: &str = "lifeOS_currentTab";

/// Legacy key for the active tab.
pub const LEGACY_TAB_KEY: &str = "activeTab";

/// One hydrated subtree: its state path and the legacy unprefixed key that
/// older builds wrote it under, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HydrationEntry {
    pub path: &'static str,
    pub legacy_key: Option<&'static str>,
}

pub const HYDRATED: &[HydrationEntry] = &[
    HydrationEntry { path: "settings", legacy_key: None },
    HydrationEntry { path: "tasks", legacy_key: Some("tasks") },
    HydrationEntry { path: "goals", legacy_key: Some("goals") },
    HydrationEntry { path: "habits", legacy_key: Some("habits") },
    HydrationEntry { path: "completedTasks", legacy_key: None },
    HydrationEntry { path: "transactions", legacy_key: None },
    HydrationEntry { path: "categories", legacy_key: None },
    HydrationEntry { path: "mits", legacy_key: None },
    HydrationEntry { path: "dailyReview", legacy_key: None },
    HydrationEntry { path: "scrollPositions", legacy_key: None },
    HydrationEntry { path: "currentTab", legacy_key: Some(LEGACY_TAB_KEY) },
];

/// Storage key for a state path: dots become underscores, then prefixed.
pub fn storage_key(path: &str) -> String {
    format!("{STATE_PREFIX}{}", path.replace('.', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_derivation() {
        assert_eq!(storage_key("tasks"), "lifeOS_tasks");
        assert_eq!(storage_key("settings.theme"), "lifeOS_settings_theme");
        assert_eq!(storage_key("currentTab"), CURRENT_TAB_KEY);
    }

    #[test]
    fn hydration_table_is_top_level() {
        for entry in HYDRATED {
            assert!(!entry.path.contains('.'), "{}", entry.path);
        }
    }
}
