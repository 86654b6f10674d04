mod sections;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use lifeos_core::{events, EventBus};
use lifeos_engine::{
    default_load_table, App, HeadlessSurface, LazyLoader, ModuleLayout, ModuleManager, Navigation,
    Router, RouterDeps, TabLayout,
};
use lifeos_settings::LifeOsSettings;
use lifeos_store::{Database, SqliteStorage, StateStore};
use lifeos_telemetry::{init_telemetry, TelemetryConfig};

use crate::sections::{section, section_resolver};

#[derive(Parser)]
#[command(name = "lifeos", version, about = "Life OS host")]
struct Cli {
    /// Settings file (defaults to ~/.lifeos/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// SQLite database, overriding the configured path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start up and print the init report, modules and health.
    Status,
    /// Read or write the state tree.
    State {
        #[command(subcommand)]
        action: StateCommand,
    },
    /// Switch to a tab and wait for its render.
    Navigate { tab: String },
    /// Manage active tasks.
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },
    /// List event listeners.
    Events,
}

#[derive(Subcommand)]
enum StateCommand {
    /// Print the value at PATH, or the whole tree.
    Get { path: Option<String> },
    /// Write a JSON value at PATH.
    Set { path: String, value: String },
}

#[derive(Subcommand)]
enum TaskCommand {
    Add { text: String },
    Complete { id: String },
    Remove { id: String },
    List,
}

struct Host {
    app: App,
    router: Arc<Router>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => lifeos_settings::load_settings_from_path(path),
        None => lifeos_settings::load_settings(),
    }
    .context("loading settings")?;
    if let Some(db) = &cli.db {
        settings.storage.db_path = db.to_string_lossy().into_owned();
    }

    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        settings
            .logging
            .module_levels
            .iter()
            .map(|(target, level)| (target.as_str(), level.as_str())),
        settings.logging.json,
    );
    if let Err(e) = init_telemetry(&telemetry) {
        eprintln!("lifeos: {e}");
    }

    let host = compose(&settings).await?;
    let report = match host.app.init().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => print_json(&json!({
            "report": report,
            "modules": host.app.modules().list_modules(),
            "health": host.app.health_check(),
        })),
        Command::State { action } => run_state(&host, action),
        Command::Navigate { tab } => navigate(&host, &tab).await,
        Command::Task { action } => run_task(&host, action),
        Command::Events => print_json(&json!(host.app.bus().list_events())),
    }
}

/// Build every component from settings and register the section modules.
async fn compose(settings: &LifeOsSettings) -> anyhow::Result<Host> {
    let db_path = Path::new(&settings.storage.db_path);
    let db = Database::open(db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    let bus = EventBus::new();
    trace_events(&bus);
    let store = StateStore::with_events(Arc::new(SqliteStorage::new(db)), bus.clone());
    let layout = layout_from(settings);

    let resolver = section_resolver(
        &store,
        &bus,
        Duration::from_millis(settings.loader.settle_delay_ms),
    );
    let loader = LazyLoader::new(default_load_table(), Arc::new(resolver), bus.clone());
    for (name, result) in loader.load_critical_modules().await {
        if let Err(e) = result {
            warn!(module = %name, error = %e, "critical module failed to load");
        }
    }
    let preloaded = loader
        .preload_modules(layout.init_order().to_vec())
        .await
        .context("preload task")?;
    debug!(preloaded, "sections preloaded");

    let manager = Arc::new(ModuleManager::new(layout.clone(), bus.clone()));
    for name in layout.init_order() {
        match loader.load_module(name).await {
            Ok(module) => {
                let deps = section(name).map_or(&[][..], |s| s.dependencies);
                manager.register(name, module, deps.iter().copied());
            }
            Err(e) => warn!(module = %name, error = %e, "module unavailable, not registered"),
        }
    }

    let surface = Arc::new(HeadlessSurface::new(layout.tab_ids()));
    let router = Arc::new(Router::new(
        RouterDeps::new(surface.clone(), store.clone(), bus.clone())
            .with_modules(manager.clone())
            .with_home_tab(settings.router.default_tab.clone()),
    ));
    let app = App::new(bus, store, manager, surface).with_router(router.clone());
    info!(modules = app.modules().count(), "host composed");
    Ok(Host { app, router })
}

fn layout_from(settings: &LifeOsSettings) -> ModuleLayout {
    let mut layout = ModuleLayout::default();
    if let Some(order) = &settings.modules.init_order {
        layout = layout.with_init_order(order.clone());
    }
    if let Some(tabs) = &settings.modules.tabs {
        layout = layout.with_tabs(
            tabs.iter()
                .map(|t| TabLayout::new(t.tab.clone(), t.modules.iter().cloned()))
                .collect(),
        );
    }
    layout
}

/// Log every conventional event at debug level.
fn trace_events(bus: &EventBus) {
    for &event in events::ALL {
        let _ = bus.on(event, "cli", move |data| {
            debug!(event, %data, "event");
            Ok(())
        });
    }
}

fn run_state(host: &Host, action: StateCommand) -> anyhow::Result<()> {
    let store = host.app.store();
    match action {
        StateCommand::Get { path: None } => print_json(&store.get_state()),
        StateCommand::Get { path: Some(path) } => {
            print_json(&store.get(&path).unwrap_or(Value::Null))
        }
        StateCommand::Set { path, value } => {
            let value: Value = serde_json::from_str(&value)
                .with_context(|| format!("value for {path} is not valid JSON"))?;
            store.set_state(&path, value)?;
            print_json(&store.get(&path).unwrap_or(Value::Null))
        }
    }
}

async fn navigate(host: &Host, tab: &str) -> anyhow::Result<()> {
    match host.router.navigate_to_tab(tab) {
        Navigation::Unchanged => print_json(&json!({ "tab": tab, "changed": false })),
        Navigation::UnknownTab => bail!(
            "unknown tab {tab}; available: {}",
            host.router.available_tabs().join(", ")
        ),
        nav => {
            let rendered = nav.rendered().await;
            print_json(&json!({ "tab": tab, "changed": true, "rendered": rendered }))
        }
    }
}

fn run_task(host: &Host, action: TaskCommand) -> anyhow::Result<()> {
    let store = host.app.store();
    let bus = host.app.bus();
    match action {
        TaskCommand::Add { text } => {
            let task = json!({
                "id": next_task_id(store),
                "text": text,
                "completed": false,
                "createdAt": chrono::Utc::now().to_rfc3339(),
            });
            store.add_task(task.clone())?;
            bus.emit(events::TASK_ADDED, &task);
            print_json(&task)
        }
        TaskCommand::Complete { id } => {
            let id = parse_id(&id);
            if !store.complete_task(&id)? {
                bail!("no task with id {id}");
            }
            bus.emit(events::TASK_COMPLETED, &json!({ "id": id }));
            print_json(&json!({ "completed": id }))
        }
        TaskCommand::Remove { id } => {
            let id = parse_id(&id);
            if !store.remove_task(&id)? {
                bail!("no task with id {id}");
            }
            bus.emit(events::TASK_REMOVED, &json!({ "id": id }));
            print_json(&json!({ "removed": id }))
        }
        TaskCommand::List => print_json(&store.get("tasks").unwrap_or(json!([]))),
    }
}

/// One more than the largest numeric id among active and completed tasks.
fn next_task_id(store: &StateStore) -> u64 {
    ["tasks", "completedTasks"]
        .iter()
        .filter_map(|path| store.get(path))
        .filter_map(|list| list.as_array().cloned())
        .flatten()
        .filter_map(|task| task.get("id").and_then(Value::as_u64))
        .max()
        .map_or(1, |max| max + 1)
}

/// Numeric ids stay numbers; anything else is matched as a string.
fn parse_id(raw: &str) -> Value {
    raw.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
