use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::ModuleError;

/// Which optional lifecycle hooks a module implements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub init: bool,
    pub render: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        init: false,
        render: false,
    };
    pub const INIT: Self = Self {
        init: true,
        render: false,
    };
    pub const RENDER: Self = Self {
        init: false,
        render: true,
    };
    pub const ALL: Self = Self {
        init: true,
        render: true,
    };
}

/// Dependencies handed to a module's `init`, resolved by the module manager.
#[derive(Clone, Default)]
pub struct ModuleContext {
    name: String,
    dependencies: HashMap<String, Arc<dyn Module>>,
}

impl ModuleContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: HashMap::new(),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, module: Arc<dyn Module>) -> Self {
        self.dependencies.insert(name.into(), module);
        self
    }

    /// Name the module was registered under.
    pub fn module_name(&self) -> &str {
        &self.name
    }

    pub fn dependency(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.dependencies.get(name).cloned()
    }

    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dependencies.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A feature module. Both hooks are optional; `capabilities` says which ones
/// the manager should call.
#[async_trait]
pub trait Module: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    async fn init(&self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn render(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl Module for Bare {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }
    }

    #[tokio::test]
    async fn default_hooks_succeed() {
        let m = Bare;
        assert!(m.init(&ModuleContext::new("bare")).await.is_ok());
        assert!(m.render().await.is_ok());
    }

    #[test]
    fn context_dependencies_sorted() {
        let ctx = ModuleContext::new("metrics")
            .with_dependency("tasks", Arc::new(Bare))
            .with_dependency("habits", Arc::new(Bare));
        assert_eq!(ctx.module_name(), "metrics");
        assert_eq!(ctx.dependency_names(), vec!["habits", "tasks"]);
        assert!(ctx.dependency("tasks").is_some());
        assert!(ctx.dependency("goals").is_none());
    }
}
