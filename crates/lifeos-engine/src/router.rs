//! Tab navigation over a [`PageSurface`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lifeos_core::{events, EventBus, PageSurface};
use lifeos_store::keys::{CURRENT_TAB_KEY, LEGACY_TAB_KEY};
use lifeos_store::storage::write_json;
use lifeos_store::{KeyValueStorage, StateStore, DEFAULT_TAB};

use crate::manager::ModuleManager;

/// Collaborators the router needs.
#[derive(Clone)]
pub struct RouterDeps {
    pub surface: Arc<dyn PageSurface>,
    pub store: StateStore,
    pub bus: EventBus,
    /// Without a manager, navigation still works but nothing is rendered.
    pub modules: Option<Arc<ModuleManager>>,
    /// Fallback tab and the target of Escape.
    pub home_tab: String,
}

impl RouterDeps {
    pub fn new(surface: Arc<dyn PageSurface>, store: StateStore, bus: EventBus) -> Self {
        Self {
            surface,
            store,
            bus,
            modules: None,
            home_tab: DEFAULT_TAB.to_string(),
        }
    }

    pub fn with_modules(mut self, modules: Arc<ModuleManager>) -> Self {
        self.modules = Some(modules);
        self
    }

    pub fn with_home_tab(mut self, tab: impl Into<String>) -> Self {
        self.home_tab = tab.into();
        self
    }
}

/// Outcome of [`Router::navigate_to_tab`].
#[derive(Debug)]
pub enum Navigation {
    /// Target was already the current tab.
    Unchanged,
    /// Target is not a live page.
    UnknownTab,
    Navigated {
        from: String,
        /// Background render of the new tab's modules; yields the number
        /// rendered. `None` when rendering was skipped.
        render: Option<JoinHandle<usize>>,
    },
}

impl Navigation {
    pub fn is_navigated(&self) -> bool {
        matches!(self, Self::Navigated { .. })
    }

    /// Wait for the tab render, if one was started.
    pub async fn rendered(self) -> usize {
        match self {
            Self::Navigated {
                render: Some(handle),
                ..
            } => match handle.await {
                Ok(count) => count,
                Err(e) => {
                    warn!(error = %e, "render task failed");
                    0
                }
            },
            _ => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Digit(u8),
    Escape,
    Other,
}

/// A key press with its modifier state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyInput {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
        }
    }

    pub fn ctrl(key: Key) -> Self {
        Self {
            key,
            ctrl: true,
            meta: false,
        }
    }
}

#[derive(Debug)]
struct RouterState {
    current: String,
    initialized: bool,
}

pub struct Router {
    deps: RouterDeps,
    storage: Arc<dyn KeyValueStorage>,
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new(deps: RouterDeps) -> Self {
        let storage = deps.store.storage();
        let current = deps.home_tab.clone();
        Self {
            deps,
            storage,
            state: Mutex::new(RouterState {
                current,
                initialized: false,
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn current_tab(&self) -> String {
        self.state.lock().current.clone()
    }

    /// Live page ids, in surface order.
    pub fn available_tabs(&self) -> Vec<String> {
        self.deps.surface.pages()
    }

    /// Restore the last tab and start its render. Later calls do nothing.
    pub fn init(&self) -> Option<JoinHandle<usize>> {
        {
            let mut state = self.state.lock();
            if state.initialized {
                debug!("router already initialized");
                return None;
            }
            state.initialized = true;
        }

        let mut tab = self.initial_tab();
        if !self.deps.surface.has_page(&tab) {
            warn!(tab = %tab, fallback = %self.deps.home_tab, "restored tab has no page");
            tab = self.deps.home_tab.clone();
        }
        self.state.lock().current = tab.clone();

        if self.deps.store.current_tab() != tab {
            if let Err(e) = self.deps.store.switch_tab(&tab) {
                warn!(error = %e, "failed to record restored tab");
            }
        }
        self.deps.surface.activate(&tab);
        self.deps
            .surface
            .set_scroll_offset(self.deps.store.get_scroll_position(&tab));

        info!(tab = %tab, "router initialized");
        self.spawn_render(&tab)
    }

    /// Store → `lifeOS_currentTab` → `activeTab` → home. A source is only
    /// consulted while the answer so far is absent or the default tab.
    fn initial_tab(&self) -> String {
        let mut tab = self.deps.store.current_tab();
        for key in [CURRENT_TAB_KEY, LEGACY_TAB_KEY] {
            if tab != DEFAULT_TAB {
                break;
            }
            if let Some(stored) = self.stored_tab(key) {
                tab = stored;
            }
        }
        if tab == DEFAULT_TAB {
            return self.deps.home_tab.clone();
        }
        tab
    }

    /// Tab id under `key`, accepting a JSON string or a raw value.
    fn stored_tab(&self, key: &str) -> Option<String> {
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "failed to read stored tab");
                return None;
            }
        };
        let tab = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::String(s)) => s,
            _ => raw.trim().to_string(),
        };
        (!tab.is_empty()).then_some(tab)
    }

    pub fn navigate_to_tab(&self, tab: &str) -> Navigation {
        let from = self.current_tab();
        if from == tab {
            debug!(tab, "already on tab");
            return Navigation::Unchanged;
        }
        if !self.deps.surface.has_page(tab) {
            warn!(tab, "navigation to unknown tab ignored");
            return Navigation::UnknownTab;
        }

        let offset = self.deps.surface.scroll_offset();
        if let Err(e) = self.deps.store.save_scroll_position(&from, offset) {
            warn!(tab = %from, error = %e, "failed to save scroll position");
        }

        self.state.lock().current = tab.to_string();
        if let Err(e) = self.deps.store.switch_tab(tab) {
            warn!(tab, error = %e, "failed to record tab in store");
        }
        self.persist_tab(tab);

        self.deps.surface.activate(tab);
        self.deps
            .surface
            .set_scroll_offset(self.deps.store.get_scroll_position(tab));

        self.deps.bus.emit(
            events::NAVIGATION_CHANGED,
            &json!({ "from": from, "to": tab }),
        );
        self.deps.bus.emit(
            events::TAB_SWITCHED,
            &json!({ "tab": tab, "previousTab": from }),
        );
        info!(from = %from, to = tab, "navigated");

        Navigation::Navigated {
            from,
            render: self.spawn_render(tab),
        }
    }

    /// Re-render the current tab.
    pub fn refresh(&self) -> Option<JoinHandle<usize>> {
        let tab = self.current_tab();
        self.spawn_render(&tab)
    }

    /// Ctrl/Cmd + 1-5 selects the Nth nav button; Escape goes home.
    /// Returns `None` for keys the router does not handle.
    pub fn handle_key(&self, input: KeyInput) -> Option<Navigation> {
        match input.key {
            Key::Digit(n @ 1..=5) if input.ctrl || input.meta => {
                let buttons = self.deps.surface.nav_buttons();
                let target = buttons.get(usize::from(n) - 1)?;
                Some(self.navigate_to_tab(target))
            }
            Key::Escape if self.current_tab() != self.deps.home_tab => {
                let home = self.deps.home_tab.clone();
                Some(self.navigate_to_tab(&home))
            }
            _ => None,
        }
    }

    fn persist_tab(&self, tab: &str) {
        let value = Value::String(tab.to_string());
        for key in [CURRENT_TAB_KEY, LEGACY_TAB_KEY] {
            if let Err(e) = write_json(self.storage.as_ref(), key, &value) {
                warn!(key, error = %e, "failed to persist current tab");
            }
        }
    }

    fn spawn_render(&self, tab: &str) -> Option<JoinHandle<usize>> {
        let Some(modules) = self.deps.modules.clone() else {
            warn!(tab, "no module manager, render skipped");
            return None;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(tab, "no async runtime, render skipped");
            return None;
        };
        let tab = tab.to_string();
        Some(handle.spawn(async move {
            tokio::task::yield_now().await;
            modules.render_modules_for_tab(&tab).await
        }))
    }
}
