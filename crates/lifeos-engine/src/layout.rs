//! The one table of module initialization order and tab → module mapping.
//!
//! Owned by [`ModuleManager`](crate::ModuleManager); the router and app
//! read it through the manager instead of keeping their own copies.

use serde::Serialize;

/// Modules rendered when a tab is activated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TabLayout {
    pub tab: String,
    pub modules: Vec<String>,
}

impl TabLayout {
    pub fn new<I, S>(tab: impl Into<String>, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tab: tab.into(),
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleLayout {
    init_order: Vec<String>,
    tabs: Vec<TabLayout>,
}

const DEFAULT_INIT_ORDER: &[&str] = &[
    "theme", "tasks", "goals", "habits", "mood", "journal", "pomodoro", "finance", "metrics",
];

const DEFAULT_TABS: &[(&str, &[&str])] = &[
    ("inicio", &["tasks", "habits", "mood"]),
    ("tareas", &["tasks"]),
    ("metas", &["goals"]),
    ("habitos", &["habits"]),
    ("diario", &["journal", "mood"]),
    ("pomodoro", &["pomodoro"]),
    ("finanzas", &["finance"]),
    ("metricas", &["metrics"]),
];

impl Default for ModuleLayout {
    fn default() -> Self {
        Self {
            init_order: DEFAULT_INIT_ORDER.iter().map(|s| s.to_string()).collect(),
            tabs: DEFAULT_TABS
                .iter()
                .map(|(tab, modules)| TabLayout::new(*tab, modules.iter().copied()))
                .collect(),
        }
    }
}

impl ModuleLayout {
    pub fn new(init_order: Vec<String>, tabs: Vec<TabLayout>) -> Self {
        Self { init_order, tabs }
    }

    /// Empty layout: nothing initialized, no tab renders anything.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn with_init_order(mut self, order: Vec<String>) -> Self {
        self.init_order = order;
        self
    }

    pub fn with_tabs(mut self, tabs: Vec<TabLayout>) -> Self {
        self.tabs = tabs;
        self
    }

    pub fn init_order(&self) -> &[String] {
        &self.init_order
    }

    /// Modules for `tab`, empty for unknown tabs.
    pub fn modules_for_tab(&self, tab: &str) -> &[String] {
        self.tabs
            .iter()
            .find(|t| t.tab == tab)
            .map(|t| t.modules.as_slice())
            .unwrap_or(&[])
    }

    /// Tab ids in display order.
    pub fn tab_ids(&self) -> Vec<String> {
        self.tabs.iter().map(|t| t.tab.clone()).collect()
    }

    pub fn tabs(&self) -> &[TabLayout] {
        &self.tabs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_consistent() {
        let layout = ModuleLayout::default();
        // Every module rendered by some tab is initialized at startup
        for tab in layout.tabs() {
            for module in &tab.modules {
                assert!(
                    layout.init_order().contains(module),
                    "{module} on {} is never initialized",
                    tab.tab
                );
            }
        }
        assert_eq!(layout.tab_ids()[0], "inicio");
    }

    #[test]
    fn metrics_after_its_sources() {
        let order = ModuleLayout::default().init_order().to_vec();
        let pos = |name: &str| order.iter().position(|m| m == name).unwrap();
        assert!(pos("metrics") > pos("tasks"));
        assert!(pos("metrics") > pos("habits"));
    }

    #[test]
    fn unknown_tab_has_no_modules() {
        let layout = ModuleLayout::default();
        assert!(layout.modules_for_tab("nowhere").is_empty());
        assert_eq!(layout.modules_for_tab("diario"), ["journal", "mood"]);
    }

    #[test]
    fn overrides() {
        let layout = ModuleLayout::empty()
            .with_init_order(vec!["a".into(), "b".into()])
            .with_tabs(vec![TabLayout::new("home", ["b"])]);
        assert_eq!(layout.init_order(), ["a", "b"]);
        assert_eq!(layout.modules_for_tab("home"), ["b"]);
    }
}
