use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use lifeos_core::{events, Capabilities, EventBus, Module, ModuleContext, ModuleError};

use crate::layout::ModuleLayout;

/// Lifecycle state of a registered module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Registered,
    Initializing,
    Initialized,
    Error,
}

struct ModuleEntry {
    instance: Arc<dyn Module>,
    dependencies: Vec<String>,
    state: ModuleState,
    last_error: Option<String>,
    seq: u64,
}

/// Snapshot of one registry entry.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub state: ModuleState,
    pub dependencies: Vec<String>,
    pub capabilities: Capabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Result of initializing one module during [`ModuleManager::initialize_all`].
#[derive(Clone, Debug)]
pub struct InitOutcome {
    pub name: String,
    pub result: Result<(), ModuleError>,
}

impl InitOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl Serialize for InitOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("InitOutcome", 3)?;
        out.serialize_field("name", &self.name)?;
        out.serialize_field("ok", &self.result.is_ok())?;
        out.serialize_field(
            "error",
            &self.result.as_ref().err().map(ToString::to_string),
        )?;
        out.end()
    }
}

/// Dependency-injecting module registry.
///
/// The registry lock is never held across a module's `init` or `render`.
pub struct ModuleManager {
    modules: RwLock<HashMap<String, ModuleEntry>>,
    layout: ModuleLayout,
    bus: EventBus,
    next_seq: AtomicU64,
}

impl ModuleManager {
    pub fn new(layout: ModuleLayout, bus: EventBus) -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            layout,
            bus,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn layout(&self) -> &ModuleLayout {
        &self.layout
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Register `instance` under `name`. Re-registering replaces the entry
    /// and resets it to `Registered`.
    pub fn register<I, S>(&self, name: &str, instance: Arc<dyn Module>, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dependencies: Vec<String> = dependencies.into_iter().map(Into::into).collect();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let previous = self.modules.write().insert(
            name.to_string(),
            ModuleEntry {
                instance,
                dependencies: dependencies.clone(),
                state: ModuleState::Registered,
                last_error: None,
                seq,
            },
        );
        if previous.is_some() {
            warn!(module = name, "module re-registered, previous entry replaced");
        } else {
            debug!(module = name, ?dependencies, "module registered");
        }
        self.bus.emit(
            events::MODULE_REGISTERED,
            &json!({ "name": name, "dependencies": dependencies }),
        );
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.read().get(name).map(|e| Arc::clone(&e.instance))
    }

    pub fn has(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.modules.read().get(name).map(|e| e.state)
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.state(name) == Some(ModuleState::Initialized)
    }

    pub fn last_error(&self, name: &str) -> Option<String> {
        self.modules.read().get(name).and_then(|e| e.last_error.clone())
    }

    pub fn count(&self) -> usize {
        self.modules.read().len()
    }

    /// Initialize one module after checking its dependencies.
    ///
    /// Already-initialized modules succeed without calling `init` again.
    #[instrument(skip(self))]
    pub async fn initialize_module(&self, name: &str) -> Result<(), ModuleError> {
        let instance = self
            .get(name)
            .ok_or_else(|| ModuleError::NotRegistered(name.to_string()))?;
        let capabilities = instance.capabilities();

        let (ctx, seq) = {
            let mut modules = self.modules.write();
            let entry = modules
                .get(name)
                .ok_or_else(|| ModuleError::NotRegistered(name.to_string()))?;
            match entry.state {
                ModuleState::Initialized => return Ok(()),
                ModuleState::Initializing => {
                    return Err(ModuleError::InitInProgress(name.to_string()))
                }
                ModuleState::Registered | ModuleState::Error => {}
            }

            let mut ctx = ModuleContext::new(name);
            let mut failure = None;
            for dep in &entry.dependencies {
                match modules.get(dep) {
                    None => {
                        failure = Some(ModuleError::MissingDependency {
                            module: name.to_string(),
                            dependency: dep.clone(),
                        });
                        break;
                    }
                    Some(d) if d.state != ModuleState::Initialized => {
                        failure = Some(ModuleError::UninitializedDependency {
                            module: name.to_string(),
                            dependency: dep.clone(),
                        });
                        break;
                    }
                    Some(d) => ctx = ctx.with_dependency(dep.clone(), Arc::clone(&d.instance)),
                }
            }

            let entry = modules
                .get_mut(name)
                .ok_or_else(|| ModuleError::NotRegistered(name.to_string()))?;
            if let Some(err) = failure {
                entry.state = ModuleState::Error;
                entry.last_error = Some(err.to_string());
                drop(modules);
                self.report_failure(name, &err);
                return Err(err);
            }
            if !capabilities.init {
                entry.state = ModuleState::Initialized;
                entry.last_error = None;
                drop(modules);
                self.report_success(name);
                return Ok(());
            }
            entry.state = ModuleState::Initializing;
            (ctx, entry.seq)
        };

        let result = match AssertUnwindSafe(instance.init(&ctx)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_panic) => Err(ModuleError::Panicked(name.to_string())),
        };

        {
            let mut modules = self.modules.write();
            match modules.get_mut(name) {
                // Re-registered while init was running; the new entry keeps its own state.
                Some(entry) if entry.seq != seq => {
                    warn!(module = name, "module replaced during init, result discarded");
                }
                Some(entry) => match &result {
                    Ok(()) => {
                        entry.state = ModuleState::Initialized;
                        entry.last_error = None;
                    }
                    Err(e) => {
                        entry.state = ModuleState::Error;
                        entry.last_error = Some(e.to_string());
                    }
                },
                None => warn!(module = name, "module cleared during init"),
            }
        }

        match &result {
            Ok(()) => self.report_success(name),
            Err(e) => self.report_failure(name, e),
        }
        result
    }

    /// Reset a module to `Registered` and run its init again.
    pub async fn reinitialize(&self, name: &str) -> Result<(), ModuleError> {
        {
            let mut modules = self.modules.write();
            let entry = modules
                .get_mut(name)
                .ok_or_else(|| ModuleError::NotRegistered(name.to_string()))?;
            if entry.state == ModuleState::Initializing {
                return Err(ModuleError::InitInProgress(name.to_string()));
            }
            entry.state = ModuleState::Registered;
        }
        info!(module = name, "reinitializing module");
        self.initialize_module(name).await
    }

    /// Initialize every module in the layout's order. Unregistered names are
    /// skipped; failures do not stop the walk.
    pub async fn initialize_all(&self) -> Vec<InitOutcome> {
        let mut outcomes = Vec::new();
        for name in self.layout.init_order() {
            if !self.has(name) {
                warn!(module = %name, "module in init order is not registered, skipping");
                continue;
            }
            let result = self.initialize_module(name).await;
            outcomes.push(InitOutcome {
                name: name.clone(),
                result,
            });
        }
        let ok = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(initialized = ok, attempted = outcomes.len(), "module initialization finished");
        outcomes
    }

    /// Render the modules listed for `tab` that are ready to render.
    /// Returns how many rendered successfully.
    #[instrument(skip(self))]
    pub async fn render_modules_for_tab(&self, tab: &str) -> usize {
        let mut rendered = 0;
        for name in self.layout.modules_for_tab(tab) {
            let Some(instance) = self.get(name) else {
                debug!(module = %name, "render skipped: not registered");
                continue;
            };
            if !self.is_initialized(name) {
                debug!(module = %name, "render skipped: not initialized");
                continue;
            }
            if !instance.capabilities().render {
                continue;
            }
            let err = match AssertUnwindSafe(instance.render()).catch_unwind().await {
                Ok(Ok(())) => {
                    rendered += 1;
                    self.bus
                        .emit(events::MODULE_RENDERED, &json!({ "name": name, "tab": tab }));
                    continue;
                }
                Ok(Err(ModuleError::Render(reason))) => ModuleError::Render(reason),
                Ok(Err(e)) => ModuleError::Render(e.to_string()),
                Err(_panic) => ModuleError::Render(format!("module {name} panicked")),
            };
            warn!(module = %name, kind = err.error_kind(), error = %err, "module render failed");
        }
        rendered
    }

    /// Registry snapshot in registration order.
    pub fn list_modules(&self) -> Vec<ModuleSummary> {
        let modules = self.modules.read();
        let mut entries: Vec<(&String, &ModuleEntry)> = modules.iter().collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
            .into_iter()
            .map(|(name, e)| ModuleSummary {
                name: name.clone(),
                state: e.state,
                dependencies: e.dependencies.clone(),
                capabilities: e.instance.capabilities(),
                last_error: e.last_error.clone(),
            })
            .collect()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.modules.write().clear();
    }

    fn report_success(&self, name: &str) {
        info!(module = name, "module initialized");
        self.bus
            .emit(events::MODULE_INITIALIZED, &json!({ "name": name }));
    }

    fn report_failure(&self, name: &str, err: &ModuleError) {
        if err.is_configuration() {
            warn!(module = name, kind = err.error_kind(), error = %err, "module not initializable");
        } else {
            error!(module = name, kind = err.error_kind(), error = %err, "module initialization failed");
        }
        self.bus.emit(
            events::MODULE_ERROR,
            &json!({ "name": name, "kind": err.error_kind(), "error": err.to_string() }),
        );
    }
}
