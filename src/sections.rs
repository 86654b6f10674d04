//! Built-in section modules.
//!
//! Each section is a thin shell over one state path: `init` watches the
//! path and announces changes with the section's domain event, `render`
//! reports how many items the path holds.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use lifeos_core::{events, Capabilities, EventBus, Module, ModuleContext, ModuleError};
use lifeos_engine::FactoryResolver;
use lifeos_store::{StateStore, StateSubscription};

#[derive(Clone, Copy, Debug)]
pub struct SectionDef {
    pub name: &'static str,
    pub state_path: &'static str,
    pub event: &'static str,
    pub dependencies: &'static [&'static str],
}

pub const SECTIONS: &[SectionDef] = &[
    SectionDef {
        name: "theme",
        state_path: "settings.theme",
        event: events::THEME_CHANGED,
        dependencies: &[],
    },
    SectionDef {
        name: "tasks",
        state_path: "tasks",
        event: events::TASK_UPDATED,
        dependencies: &[],
    },
    SectionDef {
        name: "goals",
        state_path: "goals",
        event: events::GOAL_UPDATED,
        dependencies: &[],
    },
    SectionDef {
        name: "habits",
        state_path: "habits",
        event: events::HABIT_CHECKED,
        dependencies: &[],
    },
    SectionDef {
        name: "mood",
        state_path: "mood",
        event: events::MOOD_LOGGED,
        dependencies: &[],
    },
    SectionDef {
        name: "journal",
        state_path: "journal",
        event: events::JOURNAL_SAVED,
        dependencies: &[],
    },
    SectionDef {
        name: "pomodoro",
        state_path: "pomodoro",
        event: events::POMODORO_COMPLETED,
        dependencies: &[],
    },
    SectionDef {
        name: "finance",
        state_path: "transactions",
        event: events::TRANSACTION_ADDED,
        dependencies: &[],
    },
    SectionDef {
        name: "metrics",
        state_path: "completedTasks",
        event: events::METRICS_UPDATED,
        dependencies: &["tasks", "habits"],
    },
];

pub fn section(name: &str) -> Option<&'static SectionDef> {
    SECTIONS.iter().find(|s| s.name == name)
}

pub struct SectionModule {
    def: SectionDef,
    store: StateStore,
    bus: EventBus,
    watch: Mutex<Option<StateSubscription>>,
}

impl SectionModule {
    pub fn new(def: SectionDef, store: StateStore, bus: EventBus) -> Self {
        Self {
            def,
            store,
            bus,
            watch: Mutex::new(None),
        }
    }

    fn item_count(&self) -> usize {
        count_items(self.store.get(self.def.state_path).as_ref())
    }
}

/// Entries of a list or map; a lone scalar counts as one.
fn count_items(value: Option<&Value>) -> usize {
    match value {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        Some(Value::Null) | None => 0,
        Some(_) => 1,
    }
}

#[async_trait]
impl Module for SectionModule {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn init(&self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        let bus = self.bus.clone();
        let event = self.def.event;
        let subscription = self.store.subscribe(self.def.state_path, move |value, _previous, path| {
            let count = count_items(Some(value));
            bus.emit(event, &json!({ "path": path, "count": count }));
        });
        if let Some(old) = self.watch.lock().replace(subscription) {
            let _ = old.unsubscribe();
        }
        debug!(
            section = self.def.name,
            path = self.def.state_path,
            dependencies = ?ctx.dependency_names(),
            "section watching state"
        );
        Ok(())
    }

    async fn render(&self) -> Result<(), ModuleError> {
        info!(section = self.def.name, items = self.item_count(), "section rendered");
        Ok(())
    }
}

/// Resolver with one factory per section, keyed by `sections/<name>`.
pub fn section_resolver(
    store: &StateStore,
    bus: &EventBus,
    settle_delay: std::time::Duration,
) -> FactoryResolver {
    SECTIONS.iter().fold(FactoryResolver::new(settle_delay), |resolver, def| {
        let (def, store, bus) = (*def, store.clone(), bus.clone());
        resolver.with_factory(format!("sections/{}", def.name), move || {
            Arc::new(SectionModule::new(def, store.clone(), bus.clone())) as Arc<dyn Module>
        })
    })
}
