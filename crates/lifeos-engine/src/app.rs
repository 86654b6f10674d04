use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use lifeos_core::{events, EventBus, ModuleError, PageSurface};
use lifeos_store::{HydrationReport, StateStore, StoreError};

use crate::error::AppError;
use crate::manager::{InitOutcome, ModuleManager};
use crate::router::Router;

/// What [`App::init`] did.
#[derive(Debug, Serialize)]
pub struct AppReport {
    pub hydration: HydrationReport,
    pub modules: Vec<InitOutcome>,
    pub initial_tab: String,
    /// Modules rendered for the initial tab.
    pub rendered: usize,
}

impl AppReport {
    pub fn failed_modules(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.name.as_str())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleHealth {
    pub name: String,
    pub registered: bool,
    pub renderable: bool,
    pub healthy: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub modules: Vec<ModuleHealth>,
}

/// Composition root: store, modules, navigation.
pub struct App {
    bus: EventBus,
    store: StateStore,
    modules: Arc<ModuleManager>,
    surface: Arc<dyn PageSurface>,
    router: Option<Arc<Router>>,
}

impl App {
    pub fn new(
        bus: EventBus,
        store: StateStore,
        modules: Arc<ModuleManager>,
        surface: Arc<dyn PageSurface>,
    ) -> Self {
        Self {
            bus,
            store,
            modules,
            surface,
            router: None,
        }
    }

    pub fn with_router(mut self, router: Arc<Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn modules(&self) -> &Arc<ModuleManager> {
        &self.modules
    }

    pub fn router(&self) -> Option<&Arc<Router>> {
        self.router.as_ref()
    }

    /// Hydrate the store, initialize modules, restore navigation and mark
    /// the UI ready. Only an unavailable store aborts startup.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<AppReport, AppError> {
        if !self.store.is_available() {
            error!("durable storage unavailable, aborting startup");
            return Err(AppError::StoreUnavailable);
        }
        let hydration = match self.store.init() {
            Ok(report) => report,
            Err(StoreError::Unavailable(reason)) => {
                error!(%reason, "durable storage unavailable, aborting startup");
                return Err(AppError::StoreUnavailable);
            }
            Err(e) => return Err(e.into()),
        };

        let modules = self.modules.initialize_all().await;

        let (initial_tab, rendered) = match &self.router {
            Some(router) => {
                let rendered = match router.init() {
                    Some(handle) => handle.await.unwrap_or_else(|e| {
                        warn!(error = %e, "initial render task failed");
                        0
                    }),
                    None => 0,
                };
                (router.current_tab(), rendered)
            }
            None => {
                let tab = self.store.current_tab();
                self.surface.activate(&tab);
                (tab, 0)
            }
        };

        if let Err(e) = self.store.set_state("ui.ready", Value::Bool(true)) {
            warn!(error = %e, "failed to mark ui ready");
        }
        self.surface.mark_loaded();

        let report = AppReport {
            hydration,
            modules,
            initial_tab,
            rendered,
        };
        let failed = report.failed_modules();
        self.bus.emit(
            events::APP_READY,
            &json!({ "tab": report.initial_tab, "failedModules": failed }),
        );
        info!(
            tab = %report.initial_tab,
            modules = report.modules.len(),
            failed = failed.len(),
            "app ready"
        );
        Ok(report)
    }

    /// Per module in the init order: registered and able to render.
    pub fn health_check(&self) -> HealthReport {
        let modules: Vec<ModuleHealth> = self
            .modules
            .layout()
            .init_order()
            .iter()
            .map(|name| {
                let instance = self.modules.get(name);
                let registered = instance.is_some();
                let renderable = instance.is_some_and(|m| m.capabilities().render);
                ModuleHealth {
                    name: name.clone(),
                    registered,
                    renderable,
                    healthy: registered && renderable,
                }
            })
            .collect();
        HealthReport {
            healthy: modules.iter().all(|m| m.healthy),
            modules,
        }
    }

    pub async fn reinit_module(&self, name: &str) -> Result<(), ModuleError> {
        if !self.modules.has(name) {
            return Err(ModuleError::NotRegistered(name.to_string()));
        }
        self.modules.reinitialize(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use lifeos_core::{Capabilities, Module, ModuleContext};
    use lifeos_store::{KeyValueStorage, MemoryStorage};

    use crate::layout::{ModuleLayout, TabLayout};
    use crate::router::RouterDeps;
    use crate::surface::HeadlessSurface;

    #[derive(Default)]
    struct Section {
        inits: AtomicUsize,
        renders: AtomicUsize,
    }

    #[async_trait]
    impl Module for Section {
        fn capabilities(&self) -> Capabilities {
            Capabilities::ALL
        }

        async fn init(&self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn render(&self) -> Result<(), ModuleError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Headless;

    #[async_trait]
    impl Module for Headless {
        fn capabilities(&self) -> Capabilities {
            Capabilities::INIT
        }
    }

    fn layout() -> ModuleLayout {
        ModuleLayout::empty()
            .with_init_order(vec!["theme".into(), "tasks".into(), "goals".into()])
            .with_tabs(vec![
                TabLayout::new("inicio", ["tasks"]),
                TabLayout::new("metas", ["goals"]),
            ])
    }

    fn app_with(storage: Arc<dyn KeyValueStorage>) -> (App, Arc<HeadlessSurface>) {
        let bus = EventBus::new();
        let store = StateStore::with_events(storage, bus.clone());
        let manager = Arc::new(ModuleManager::new(layout(), bus.clone()));
        let surface = Arc::new(HeadlessSurface::new(["inicio", "metas"]));
        let router = Arc::new(Router::new(
            RouterDeps::new(surface.clone(), store.clone(), bus.clone())
                .with_modules(manager.clone()),
        ));
        let app = App::new(bus, store, manager, surface.clone()).with_router(router);
        (app, surface)
    }

    #[tokio::test]
    async fn unavailable_store_aborts_before_modules() {
        let (app, surface) = app_with(Arc::new(MemoryStorage::unavailable()));
        let tasks = Arc::new(Section::default());
        app.modules().register("tasks", tasks.clone(), Vec::<String>::new());

        assert!(matches!(app.init().await, Err(AppError::StoreUnavailable)));
        assert_eq!(tasks.inits.load(Ordering::SeqCst), 0);
        assert!(!surface.is_loaded());
    }

    #[tokio::test]
    async fn init_runs_modules_then_navigation() {
        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(MemoryStorage::with_entries([("lifeOS_currentTab", "\"metas\"")]));
        let (app, surface) = app_with(storage);
        let tasks = Arc::new(Section::default());
        let goals = Arc::new(Section::default());
        app.modules().register("theme", Arc::new(Headless), Vec::<String>::new());
        app.modules().register("tasks", tasks.clone(), Vec::<String>::new());
        app.modules().register("goals", goals.clone(), ["tasks"]);

        let ready = Arc::new(AtomicUsize::new(0));
        let counter = ready.clone();
        let _sub = app.bus().on(events::APP_READY, "test", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = app.init().await.unwrap();
        assert_eq!(report.modules.len(), 3);
        assert!(report.failed_modules().is_empty());
        assert_eq!(report.initial_tab, "metas");
        assert_eq!(report.rendered, 1);
        assert_eq!(goals.renders.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.renders.load(Ordering::SeqCst), 0);

        assert_eq!(app.store().get("ui.ready"), Some(Value::Bool(true)));
        assert!(surface.is_loaded());
        assert_eq!(surface.active().as_deref(), Some("metas"));
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_without_router_activates_store_tab() {
        let bus = EventBus::new();
        let store = StateStore::new(Arc::new(MemoryStorage::new()));
        let manager = Arc::new(ModuleManager::new(layout(), bus.clone()));
        let surface = Arc::new(HeadlessSurface::new(["inicio"]));
        let app = App::new(bus, store, manager, surface.clone());

        let report = app.init().await.unwrap();
        assert_eq!(report.initial_tab, "inicio");
        assert!(report.modules.is_empty());
        assert_eq!(surface.active().as_deref(), Some("inicio"));
    }

    #[tokio::test]
    async fn health_and_reinit() {
        let (app, _surface) = app_with(Arc::new(MemoryStorage::new()));
        let tasks = Arc::new(Section::default());
        app.modules().register("theme", Arc::new(Headless), Vec::<String>::new());
        app.modules().register("tasks", tasks.clone(), Vec::<String>::new());

        let health = app.health_check();
        assert!(!health.healthy);
        let by_name = |n: &str| health.modules.iter().find(|m| m.name == n).cloned().unwrap();
        assert!(by_name("tasks").healthy);
        // Registered but cannot render
        assert!(by_name("theme").registered && !by_name("theme").healthy);
        assert!(!by_name("goals").registered);

        app.init().await.unwrap();
        app.reinit_module("tasks").await.unwrap();
        assert_eq!(tasks.inits.load(Ordering::SeqCst), 2);
        assert_eq!(
            app.reinit_module("ghost").await,
            Err(ModuleError::NotRegistered("ghost".into()))
        );
    }
}
