/// Errors raised while registering, loading, initializing or rendering modules.
///
/// Configuration problems (unknown names, unresolved dependencies, unconfigured
/// lazy modules) are returned to the caller that asked for the operation.
/// Runtime failures inside a module's own `init`/`render` are wrapped in
/// `Init`/`Render`/`Panicked` so the manager can log them and move on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("module not registered: {0}")]
    NotRegistered(String),

    #[error("module {module} depends on {dependency}, which is not registered")]
    MissingDependency { module: String, dependency: String },

    #[error("module {module} depends on {dependency}, which is not initialized")]
    UninitializedDependency { module: String, dependency: String },

    #[error("module {0} is already initializing")]
    InitInProgress(String),

    #[error("module {0} is not configured for lazy loading")]
    NotConfigured(String),

    #[error("module {name} failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("init failed: {0}")]
    Init(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("module {0} panicked")]
    Panicked(String),
}

impl ModuleError {
    /// Configuration errors are caller mistakes; everything else is a
    /// runtime failure of the module itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered(_)
                | Self::MissingDependency { .. }
                | Self::UninitializedDependency { .. }
                | Self::NotConfigured(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotRegistered(_) => "not_registered",
            Self::MissingDependency { .. } => "missing_dependency",
            Self::UninitializedDependency { .. } => "uninitialized_dependency",
            Self::InitInProgress(_) => "init_in_progress",
            Self::NotConfigured(_) => "not_configured",
            Self::LoadFailed { .. } => "load_failed",
            Self::Init(_) => "init",
            Self::Render(_) => "render",
            Self::Panicked(_) => "panicked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_classification() {
        assert!(ModuleError::NotRegistered("a".into()).is_configuration());
        assert!(ModuleError::NotConfigured("a".into()).is_configuration());
        assert!(ModuleError::UninitializedDependency {
            module: "b".into(),
            dependency: "a".into(),
        }
        .is_configuration());
        assert!(!ModuleError::Init("boom".into()).is_configuration());
        assert!(!ModuleError::Panicked("a".into()).is_configuration());
    }

    #[test]
    fn dependency_error_names_both_modules() {
        let err = ModuleError::UninitializedDependency {
            module: "goals".into(),
            dependency: "tasks".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("goals"));
        assert!(msg.contains("tasks"));
        assert_eq!(err.error_kind(), "uninitialized_dependency");
    }
}
