//! On-demand module loading.
//!
//! The loader owns a static name → [`LoadSpec`] table and delegates the
//! actual fetch to an injected [`ModuleResolver`]. Concurrent requests for
//! the same name share one in-flight future, so the resolver runs at most
//! once per name until the cache is cleared.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lifeos_core::{events, EventBus, Module, ModuleError};

/// Load tier. Lower tiers are loaded first at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadSpec {
    /// Resolver-specific location of the module.
    pub path: String,
    pub priority: Priority,
}

impl LoadSpec {
    pub fn new(path: impl Into<String>, priority: Priority) -> Self {
        Self {
            path: path.into(),
            priority,
        }
    }
}

/// The built-in section table.
pub fn default_load_table() -> Vec<(String, LoadSpec)> {
    [
        ("theme", Priority::Critical),
        ("tasks", Priority::Critical),
        ("goals", Priority::High),
        ("habits", Priority::High),
        ("mood", Priority::High),
        ("journal", Priority::Normal),
        ("pomodoro", Priority::Normal),
        ("finance", Priority::Low),
        ("metrics", Priority::Low),
    ]
    .into_iter()
    .map(|(name, priority)| {
        (
            name.to_string(),
            LoadSpec::new(format!("sections/{name}"), priority),
        )
    })
    .collect()
}

/// Fetches module instances for the loader.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// A module that is already present and needs no load.
    fn available(&self, name: &str) -> Option<Arc<dyn Module>>;

    async fn resolve(&self, name: &str, spec: &LoadSpec) -> Result<Arc<dyn Module>, ModuleError>;
}

pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

/// Resolver backed by an in-process factory table keyed by [`LoadSpec::path`].
///
/// Each resolve waits `settle_delay` before checking whether the path has a
/// factory, then constructs and exposes the instance under the module name.
pub struct FactoryResolver {
    factories: HashMap<String, ModuleFactory>,
    exposed: DashMap<String, Arc<dyn Module>>,
    settle_delay: Duration,
}

impl FactoryResolver {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            factories: HashMap::new(),
            exposed: DashMap::new(),
            settle_delay,
        }
    }

    pub fn with_factory<F>(mut self, path: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        let _ = self.factories.insert(path.into(), Arc::new(factory));
        self
    }

    /// Mark `module` as already present under `name`.
    pub fn expose(&self, name: impl Into<String>, module: Arc<dyn Module>) {
        let _ = self.exposed.insert(name.into(), module);
    }
}

#[async_trait]
impl ModuleResolver for FactoryResolver {
    fn available(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.exposed.get(name).map(|m| Arc::clone(m.value()))
    }

    async fn resolve(&self, name: &str, spec: &LoadSpec) -> Result<Arc<dyn Module>, ModuleError> {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        let factory = self
            .factories
            .get(&spec.path)
            .ok_or_else(|| ModuleError::LoadFailed {
                name: name.to_string(),
                reason: "not exposed after load".into(),
            })?;
        let module = factory();
        self.expose(name, Arc::clone(&module));
        Ok(module)
    }
}

type LoadResult = Result<Arc<dyn Module>, ModuleError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

struct LoaderInner {
    config: BTreeMap<String, LoadSpec>,
    resolver: Arc<dyn ModuleResolver>,
    loaded: DashMap<String, Arc<dyn Module>>,
    loading: DashMap<String, SharedLoad>,
    bus: EventBus,
    /// Bumped by `clear_cache`; loads started before a clear do not write back.
    generation: AtomicU64,
}

/// Cheaply clonable handle to the shared loader state.
#[derive(Clone)]
pub struct LazyLoader {
    inner: Arc<LoaderInner>,
}

impl LazyLoader {
    pub fn new<I>(config: I, resolver: Arc<dyn ModuleResolver>, bus: EventBus) -> Self
    where
        I: IntoIterator<Item = (String, LoadSpec)>,
    {
        Self {
            inner: Arc::new(LoaderInner {
                config: config.into_iter().collect(),
                resolver,
                loaded: DashMap::new(),
                loading: DashMap::new(),
                bus,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn spec(&self, name: &str) -> Option<&LoadSpec> {
        self.inner.config.get(name)
    }

    /// Configured names, sorted.
    pub fn configured(&self) -> Vec<String> {
        self.inner.config.keys().cloned().collect()
    }

    /// Load `name`, reusing the cache or an in-flight load.
    pub async fn load_module(&self, name: &str) -> LoadResult {
        if let Some(module) = self.get_loaded_module(name) {
            return Ok(module);
        }
        if let Some(module) = self.inner.resolver.available(name) {
            debug!(module = name, "module already available");
            let _ = self.inner.loaded.insert(name.to_string(), Arc::clone(&module));
            return Ok(module);
        }
        let spec = self
            .inner
            .config
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::NotConfigured(name.to_string()))?;

        let pending = match self.inner.loading.entry(name.to_string()) {
            Entry::Occupied(e) => {
                debug!(module = name, "joining in-flight load");
                e.get().clone()
            }
            Entry::Vacant(e) => {
                if let Some(module) = self.get_loaded_module(name) {
                    return Ok(module);
                }
                let fut = Self::start_load(Arc::clone(&self.inner), name.to_string(), spec)
                    .boxed()
                    .shared();
                let _ = e.insert(fut.clone());
                fut
            }
        };
        pending.await
    }

    async fn start_load(inner: Arc<LoaderInner>, name: String, spec: LoadSpec) -> LoadResult {
        let generation = inner.generation.load(Ordering::SeqCst);
        debug!(module = %name, path = %spec.path, "loading module");
        let result = inner.resolver.resolve(&name, &spec).await;

        let current = inner.generation.load(Ordering::SeqCst) == generation;
        match &result {
            Ok(module) => {
                // Cache before leaving `loading` so no lookup sees neither.
                if current {
                    let _ = inner.loaded.insert(name.clone(), Arc::clone(module));
                }
                info!(module = %name, "module loaded");
                inner
                    .bus
                    .emit(events::MODULE_LOADED, &json!({ "name": name, "path": spec.path }));
            }
            Err(e) => warn!(module = %name, error = %e, "module load failed"),
        }
        if current {
            let _ = inner.loading.remove(&name);
        }
        result
    }

    /// Load every configured module of `priority` concurrently.
    pub async fn load_modules_by_priority(&self, priority: Priority) -> Vec<(String, LoadResult)> {
        let names: Vec<String> = self
            .inner
            .config
            .iter()
            .filter(|(_, spec)| spec.priority == priority)
            .map(|(name, _)| name.clone())
            .collect();
        let results = join_all(names.iter().map(|n| self.load_module(n))).await;
        names.into_iter().zip(results).collect()
    }

    pub async fn load_critical_modules(&self) -> Vec<(String, LoadResult)> {
        self.load_modules_by_priority(Priority::Critical).await
    }

    /// Load `names` in the background. Failures are logged and dropped; the
    /// handle yields the success count.
    pub fn preload_modules(&self, names: Vec<String>) -> JoinHandle<usize> {
        let loader = self.clone();
        tokio::spawn(async move {
            let results = join_all(names.iter().map(|n| loader.load_module(n))).await;
            let loaded = results.iter().filter(|r| r.is_ok()).count();
            info!(loaded, requested = names.len(), "preload finished");
            loaded
        })
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.loaded.contains_key(name)
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.inner.loading.contains_key(name)
    }

    pub fn get_loaded_module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.inner.loaded.get(name).map(|m| Arc::clone(m.value()))
    }

    /// Names of cached modules, sorted.
    pub fn get_loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.loaded.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Forget cached and in-flight loads. Callers already awaiting an
    /// in-flight load still receive its result.
    pub fn clear_cache(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.loaded.clear();
        self.inner.loading.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use lifeos_core::Capabilities;
    use tokio::sync::Notify;

    struct Section;

    #[async_trait]
    impl Module for Section {
        fn capabilities(&self) -> Capabilities {
            Capabilities::RENDER
        }
    }

    /// Counts resolves and waits until released.
    struct SlowResolver {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ModuleResolver for SlowResolver {
        fn available(&self, _name: &str) -> Option<Arc<dyn Module>> {
            None
        }

        async fn resolve(&self, _name: &str, _spec: &LoadSpec) -> LoadResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Arc::new(Section))
        }
    }

    /// Resolves only after `release` is notified.
    #[derive(Default)]
    struct GatedResolver {
        calls: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl ModuleResolver for GatedResolver {
        fn available(&self, _name: &str) -> Option<Arc<dyn Module>> {
            None
        }

        async fn resolve(&self, _name: &str, _spec: &LoadSpec) -> LoadResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(Arc::new(Section))
        }
    }

    fn table() -> Vec<(String, LoadSpec)> {
        vec![
            ("tasks".into(), LoadSpec::new("sections/tasks", Priority::Critical)),
            ("theme".into(), LoadSpec::new("sections/theme", Priority::Critical)),
            ("finance".into(), LoadSpec::new("sections/finance", Priority::Low)),
            ("broken".into(), LoadSpec::new("sections/missing", Priority::Low)),
        ]
    }

    fn factory_loader(bus: EventBus) -> LazyLoader {
        let resolver = FactoryResolver::new(Duration::ZERO)
            .with_factory("sections/tasks", || Arc::new(Section) as Arc<dyn Module>)
            .with_factory("sections/theme", || Arc::new(Section) as Arc<dyn Module>)
            .with_factory("sections/finance", || Arc::new(Section) as Arc<dyn Module>);
        LazyLoader::new(table(), Arc::new(resolver), bus)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_resolve_once() {
        let resolver = Arc::new(SlowResolver {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let loader = LazyLoader::new(table(), resolver.clone(), EventBus::new());

        let (a, b, c) = tokio::join!(
            loader.load_module("tasks"),
            loader.load_module("tasks"),
            loader.load_module("tasks"),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded("tasks"));
        assert!(!loader.is_loading("tasks"));

        // Cached afterwards
        let d = loader.load_module("tasks").await.unwrap();
        assert!(Arc::ptr_eq(&a, &d));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_name_fails() {
        let loader = factory_loader(EventBus::new());
        assert_eq!(
            loader.load_module("ghost").await.err(),
            Some(ModuleError::NotConfigured("ghost".into()))
        );
    }

    #[tokio::test]
    async fn missing_factory_is_load_failure() {
        let loader = factory_loader(EventBus::new());
        let err = loader.load_module("broken").await.err().unwrap();
        assert!(matches!(err, ModuleError::LoadFailed { ref reason, .. } if reason.contains("not exposed")));
        assert!(!loader.is_loaded("broken"));
        assert!(!loader.is_loading("broken"));
    }

    #[tokio::test]
    async fn already_available_module_skips_resolve() {
        let resolver = Arc::new(FactoryResolver::new(Duration::ZERO));
        let present: Arc<dyn Module> = Arc::new(Section);
        resolver.expose("theme", Arc::clone(&present));
        let loader = LazyLoader::new(table(), resolver, EventBus::new());

        let got = loader.load_module("theme").await.unwrap();
        assert!(Arc::ptr_eq(&got, &present));
        assert_eq!(loader.get_loaded_modules(), vec!["theme"]);
    }

    #[tokio::test]
    async fn priority_tier_and_loaded_event() {
        let bus = EventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = bus.on(events::MODULE_LOADED, "test", move |data| {
            sink.lock().push(data["name"].as_str().unwrap_or_default().to_string());
            Ok(())
        });
        let loader = factory_loader(bus);

        let results = loader.load_critical_modules().await;
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["tasks", "theme"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["tasks", "theme"]);
        assert!(!loader.is_loaded("finance"));
    }

    #[tokio::test]
    async fn preload_swallows_failures() {
        let loader = factory_loader(EventBus::new());
        let handle = loader.preload_modules(vec!["finance".into(), "broken".into(), "ghost".into()]);
        assert_eq!(handle.await.unwrap(), 1);
        assert!(loader.is_loaded("finance"));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_is_applied() {
        let resolver = FactoryResolver::new(Duration::from_millis(100))
            .with_factory("sections/tasks", || Arc::new(Section) as Arc<dyn Module>);
        let loader = LazyLoader::new(table(), Arc::new(resolver), EventBus::new());

        let start = tokio::time::Instant::now();
        loader.load_module("tasks").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn clear_cache_forces_reload() {
        let resolver = Arc::new(SlowResolver {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let loader = LazyLoader::new(table(), resolver.clone(), EventBus::new());
        loader.load_module("tasks").await.unwrap();
        loader.clear_cache();
        assert!(!loader.is_loaded("tasks"));
        loader.load_module("tasks").await.unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_during_load_answers_waiter_without_caching() {
        let resolver = Arc::new(GatedResolver::default());
        let loader = LazyLoader::new(table(), resolver.clone(), EventBus::new());

        let waiter = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load_module("tasks").await })
        };
        while resolver.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(loader.is_loading("tasks"));

        loader.clear_cache();
        assert!(!loader.is_loading("tasks"));
        resolver.release.notify_one();

        assert!(waiter.await.unwrap().is_ok());
        assert!(!loader.is_loaded("tasks"));
        assert!(!loader.is_loading("tasks"));
        assert!(loader.get_loaded_modules().is_empty());
    }
}
