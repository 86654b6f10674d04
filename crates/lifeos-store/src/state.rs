use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};

use lifeos_core::events;
use lifeos_core::json::deep_merge;
use lifeos_core::EventBus;

use crate::error::StoreError;
use crate::keys::{self, HydrationEntry};
use crate::path;
use crate::storage::{read_json, write_json, KeyValueStorage};

/// Subscription key that matches every path.
pub const WILDCARD: &str = "*";

/// Tab shown when nothing else is known.
pub const DEFAULT_TAB: &str = "inicio";

/// Change callback: `(new_value, previous_value, path)`. The previous value
/// is `Null` when the path did not exist.
pub type StateListener = Arc<dyn Fn(&Value, &Value, &str) + Send + Sync>;

/// The in-code default tree. Hydration merges stored values over it.
pub fn default_state() -> Value {
    json!({
        "currentTab": DEFAULT_TAB,
        "settings": {
            "theme": "dark",
            "language": "es",
            "pomodoro": { "work": 25, "shortBreak": 5, "longBreak": 15 }
        },
        "tasks": [],
        "completedTasks": [],
        "goals": [],
        "habits": [],
        "transactions": [],
        "categories": [],
        "mits": [],
        "dailyReview": {},
        "scrollPositions": {},
        "ui": { "ready": false }
    })
}

/// Where a hydrated path got its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationSource {
    Prefixed,
    Legacy,
    Consolidated,
    Default,
}

/// Outcome of [`StateStore::init`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct HydrationReport {
    pub sources: Vec<(String, HydrationSource)>,
    /// Keys that were present but unreadable; their defaults were kept.
    pub failed_keys: Vec<String>,
}

impl HydrationReport {
    pub fn source_of(&self, path: &str) -> Option<HydrationSource> {
        self.sources
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, s)| *s)
    }
}

/// Several path writes applied, persisted and notified together.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    writes: Vec<(String, Value)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.writes.push((path.into(), value));
        self
    }

    pub fn push(&mut self, path: impl Into<String>, value: Value) {
        self.writes.push((path.into(), value));
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Default)]
struct Listeners {
    by_path: HashMap<String, Vec<(u64, StateListener)>>,
    next_id: u64,
}

struct Inner {
    tree: RwLock<Value>,
    listeners: Mutex<Listeners>,
    storage: Arc<dyn KeyValueStorage>,
    events: Option<EventBus>,
}

/// Handle returned by [`StateStore::subscribe`].
pub struct StateSubscription {
    store: Weak<Inner>,
    path: String,
    id: u64,
}

impl StateSubscription {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stop receiving changes. Returns false if already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.store.upgrade() else {
            return false;
        };
        let mut listeners = inner.listeners.lock();
        let Some(list) = listeners.by_path.get_mut(&self.path) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.by_path.remove(&self.path);
        }
        removed
    }
}

/// Single mutable state tree with path subscriptions and per-path
/// persistence. Cloning yields another handle to the same tree.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

impl StateStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::build(storage, None)
    }

    /// Like [`StateStore::new`], additionally announcing every change as
    /// `state:changed` on `bus`.
    pub fn with_events(storage: Arc<dyn KeyValueStorage>, bus: EventBus) -> Self {
        Self::build(storage, Some(bus))
    }

    fn build(storage: Arc<dyn KeyValueStorage>, events: Option<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(default_state()),
                listeners: Mutex::new(Listeners::default()),
                storage,
                events,
            }),
        }
    }

    pub fn storage(&self) -> Arc<dyn KeyValueStorage> {
        Arc::clone(&self.inner.storage)
    }

    pub fn is_available(&self) -> bool {
        self.inner.storage.is_available()
    }

    /// Hydrate the tree from durable storage.
    ///
    /// For each hydrated path the first present and parseable source wins:
    /// `lifeOS_<path>`, then the legacy unprefixed key, then the matching
    /// field of the consolidated blob. Failures are per key.
    #[instrument(skip(self))]
    pub fn init(&self) -> Result<HydrationReport, StoreError> {
        let storage = self.inner.storage.as_ref();
        if !storage.is_available() {
            return Err(StoreError::Unavailable("durable storage".into()));
        }

        let mut report = HydrationReport::default();
        let consolidated = match read_json(storage, keys::CONSOLIDATED_KEY) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = keys::CONSOLIDATED_KEY, error = %e, "unreadable consolidated state");
                report.failed_keys.push(keys::CONSOLIDATED_KEY.to_string());
                None
            }
        };

        let mut tree = self.inner.tree.write();
        for entry in keys::HYDRATED {
            let default = path::get_at(&tree, entry.path).cloned().unwrap_or(Value::Null);
            let (value, source) = self.hydrate_entry(entry, &default, consolidated.as_ref(), &mut report);
            if let Some(value) = value {
                let merged = if default.is_object() && value.is_object() {
                    deep_merge(default, value)
                } else {
                    value
                };
                path::set_at(&mut tree, entry.path, merged)?;
            }
            report.sources.push((entry.path.to_string(), source));
        }
        drop(tree);

        info!(
            restored = report.sources.iter().filter(|(_, s)| *s != HydrationSource::Default).count(),
            failed = report.failed_keys.len(),
            "state hydrated"
        );
        if let Some(bus) = &self.inner.events {
            bus.emit(events::STATE_HYDRATED, &json!({ "failedKeys": report.failed_keys }));
        }
        Ok(report)
    }

    fn hydrate_entry(
        &self,
        entry: &HydrationEntry,
        default: &Value,
        consolidated: Option<&Value>,
        report: &mut HydrationReport,
    ) -> (Option<Value>, HydrationSource) {
        let storage = self.inner.storage.as_ref();

        let key = keys::storage_key(entry.path);
        match read_json(storage, &key) {
            Ok(Some(v)) => return (Some(v), HydrationSource::Prefixed),
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable state key, keeping default");
                report.failed_keys.push(key);
            }
        }

        if let Some(legacy) = entry.legacy_key {
            match storage.get(legacy) {
                Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                    Ok(v) => return (Some(v), HydrationSource::Legacy),
                    // Older builds stored plain strings unquoted.
                    Err(_) if default.is_string() => {
                        return (Some(Value::String(raw)), HydrationSource::Legacy)
                    }
                    Err(e) => {
                        warn!(key = legacy, error = %e, "unreadable legacy key");
                        report.failed_keys.push(legacy.to_string());
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(key = legacy, error = %e, "legacy key read failed");
                    report.failed_keys.push(legacy.to_string());
                }
            }
        }

        if let Some(v) = consolidated
            .and_then(|blob| path::get_at(blob, entry.path))
            .filter(|v| !v.is_null())
        {
            return (Some(v.clone()), HydrationSource::Consolidated);
        }

        (None, HydrationSource::Default)
    }

    /// Snapshot of the whole tree.
    pub fn get_state(&self) -> Value {
        self.inner.tree.read().clone()
    }

    /// Value at `path`, if present.
    pub fn get(&self, path: &str) -> Option<Value> {
        path::get_at(&self.inner.tree.read(), path).cloned()
    }

    /// Write `value` at `path`, notify path then wildcard subscribers, then
    /// persist the subtree now at `path`. Persistence failures are logged only.
    pub fn set_state(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.modify(path, |_| Some(value)).map(|_| ())
    }

    /// Replace the value at `path` with `f(current)`. `current` is `Null`
    /// when the path is absent.
    ///
    /// `f` runs under the tree's write lock, so concurrent updates of the
    /// same path never lose writes. It must not call back into the store.
    pub fn update_state<F>(&self, path: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Value) -> Value,
    {
        self.modify(path, |current| Some(f(current))).map(|_| ())
    }

    /// Read, derive and write `path` under one lock. `None` from `f` leaves
    /// the tree untouched and notifies nobody.
    fn modify<F>(&self, path: &str, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&Value) -> Option<Value>,
    {
        path::segments(path)?;
        let (value, old) = {
            let mut tree = self.inner.tree.write();
            let current = path::get_at(&tree, path).cloned().unwrap_or(Value::Null);
            let Some(value) = f(&current) else {
                return Ok(false);
            };
            let old = path::set_at(&mut tree, path, value.clone())?;
            (value, old)
        };

        self.notify(path, &value, &old);
        self.persist(path);
        Ok(true)
    }

    /// Apply every write of `batch` under one lock, persist them in one
    /// storage transaction, then notify in write order. Paths are validated
    /// before anything changes.
    pub fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        for (p, _) in &batch.writes {
            path::segments(p)?;
        }
        if batch.is_empty() {
            return Ok(());
        }

        let olds = apply_writes(&mut self.inner.tree.write(), &batch.writes)?;
        self.finish_batch(&batch.writes, &olds);
        Ok(())
    }

    fn finish_batch(&self, writes: &[(String, Value)], olds: &[Value]) {
        let entries: Result<Vec<(String, String)>, StoreError> = {
            let tree = self.inner.tree.read();
            writes
                .iter()
                .map(|(p, _)| -> Result<(String, String), StoreError> {
                    let current = path::get_at(&tree, p).unwrap_or(&Value::Null);
                    Ok((keys::storage_key(p), serde_json::to_string(current)?))
                })
                .collect()
        };
        match entries.and_then(|e| self.inner.storage.set_many(&e)) {
            Ok(()) => debug!(writes = writes.len(), "batch persisted"),
            Err(e) => warn!(writes = writes.len(), error = %e, "batch persist failed"),
        }

        for ((p, v), old) in writes.iter().zip(olds) {
            self.notify(p, v, old);
        }
    }

    /// Register `callback` for changes at exactly `path`, or at every path
    /// when `path` is [`WILDCARD`].
    pub fn subscribe<F>(&self, path: &str, callback: F) -> StateSubscription
    where
        F: Fn(&Value, &Value, &str) + Send + Sync + 'static,
    {
        let mut listeners = self.inner.listeners.lock();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners
            .by_path
            .entry(path.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        StateSubscription {
            store: Arc::downgrade(&self.inner),
            path: path.to_string(),
            id,
        }
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .by_path
            .get(path)
            .map_or(0, |l| l.len())
    }

    /// Restore the default tree and drop every subscription. Durable storage
    /// is left untouched.
    pub fn reset(&self) {
        *self.inner.tree.write() = default_state();
        self.inner.listeners.lock().by_path.clear();
    }

    fn notify(&self, path: &str, value: &Value, old: &Value) {
        let snapshot: Vec<StateListener> = {
            let listeners = self.inner.listeners.lock();
            let exact = listeners.by_path.get(path).into_iter().flatten();
            let wildcard = listeners.by_path.get(WILDCARD).into_iter().flatten();
            exact.chain(wildcard).map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(value, old, path))).is_err() {
                error!(path, "state listener panicked");
            }
        }

        if let Some(bus) = &self.inner.events {
            bus.emit(events::STATE_CHANGED, &json!({ "path": path, "value": value }));
        }
    }

    /// Persist the value `path` holds now, which may differ from the one
    /// written if a listener rewrote the path during notification.
    fn persist(&self, path: &str) {
        let Some(value) = self.get(path) else {
            return;
        };
        let key = keys::storage_key(path);
        if let Err(e) = write_json(self.inner.storage.as_ref(), &key, &value) {
            warn!(key = %key, error = %e, "state persist failed");
        }
    }

    // ── Domain conveniences ─────────────────────────────────────────────

    /// Append `task` to the active task list.
    pub fn add_task(&self, task: Value) -> Result<(), StoreError> {
        self.update_state("tasks", |current| {
            let mut list = current.as_array().cloned().unwrap_or_default();
            list.push(task);
            Value::Array(list)
        })
    }

    /// Remove every active task whose `id` equals `id`.
    pub fn remove_task(&self, id: &Value) -> Result<bool, StoreError> {
        self.modify("tasks", |current| {
            let tasks = current.as_array()?;
            let remaining = without_id(tasks, id);
            (remaining.len() != tasks.len()).then_some(Value::Array(remaining))
        })
    }

    /// Move a task to the completed history, stamping completion time and
    /// date. Both lists are read and written as one batch under one lock.
    pub fn complete_task(&self, id: &Value) -> Result<bool, StoreError> {
        let now = Utc::now();
        let (writes, olds) = {
            let mut tree = self.inner.tree.write();
            let tasks = list_at(&tree, "tasks");
            let Some(task) = tasks.iter().find(|t| t.get("id") == Some(id)) else {
                debug!(%id, "complete_task: no such task");
                return Ok(false);
            };

            let mut done = match task {
                Value::Object(map) => map.clone(),
                other => {
                    let mut m = Map::new();
                    m.insert("value".into(), other.clone());
                    m
                }
            };
            done.insert("completed".into(), Value::Bool(true));
            done.insert("completedAt".into(), Value::String(now.to_rfc3339()));
            done.insert(
                "completedDate".into(),
                Value::String(now.format("%Y-%m-%d").to_string()),
            );

            let mut history = list_at(&tree, "completedTasks");
            history.push(Value::Object(done));
            let writes = vec![
                ("completedTasks".to_string(), Value::Array(history)),
                ("tasks".to_string(), Value::Array(without_id(&tasks, id))),
            ];
            let olds = apply_writes(&mut tree, &writes)?;
            (writes, olds)
        };

        self.finish_batch(&writes, &olds);
        Ok(true)
    }

    pub fn switch_tab(&self, tab: &str) -> Result<(), StoreError> {
        self.set_state("currentTab", Value::String(tab.to_string()))
    }

    pub fn current_tab(&self) -> String {
        self.get("currentTab")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| DEFAULT_TAB.to_string())
    }

    /// Record the scroll offset of `tab`. The whole map is rewritten so it
    /// persists under the hydrated `lifeOS_scrollPositions` key.
    pub fn save_scroll_position(&self, tab: &str, offset: f64) -> Result<(), StoreError> {
        self.update_state("scrollPositions", |current| {
            let mut map = current.as_object().cloned().unwrap_or_default();
            map.insert(tab.to_string(), json!(offset));
            Value::Object(map)
        })
    }

    pub fn get_scroll_position(&self, tab: &str) -> f64 {
        self.get("scrollPositions")
            .and_then(|m| m.get(tab).and_then(Value::as_f64))
            .unwrap_or(0.0)
    }
}

fn apply_writes(tree: &mut Value, writes: &[(String, Value)]) -> Result<Vec<Value>, StoreError> {
    writes
        .iter()
        .map(|(p, v)| path::set_at(tree, p, v.clone()))
        .collect()
}

fn list_at(tree: &Value, path: &str) -> Vec<Value> {
    path::get_at(tree, path)
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
}

fn without_id(tasks: &[Value], id: &Value) -> Vec<Value> {
    tasks
        .iter()
        .filter(|t| t.get("id") != Some(id))
        .cloned()
        .collect()
}
