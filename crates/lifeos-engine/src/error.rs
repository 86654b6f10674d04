use lifeos_core::ModuleError;
use lifeos_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("durable storage is unavailable")]
    StoreUnavailable,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("module error: {0}")]
    Module(#[from] ModuleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let err: AppError = ModuleError::NotRegistered("tasks".into()).into();
        assert!(matches!(err, AppError::Module(ModuleError::NotRegistered(_))));
        assert!(err.to_string().contains("tasks"));

        let err: AppError = StoreError::InvalidPath("a..b".into()).into();
        assert!(matches!(err, AppError::Store(_)));
    }
}
