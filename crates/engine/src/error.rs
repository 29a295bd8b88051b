//! The engine's own error enum (spec §7), mapping onto [`oj_core::ErrorCategory`].

use oj_core::error::ErrorCategory;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("lock contention: {0}")]
    LockContention(String),
    #[error("backend failure: {0}")]
    BackendFailure(String),
    #[error("corrupt state: {0}")]
    Corrupt(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::NotFound(_) => ErrorCategory::NotFound,
            EngineError::PreconditionFailed(_) => ErrorCategory::PreconditionFailed,
            EngineError::LockContention(_) => ErrorCategory::LockContention,
            EngineError::BackendFailure(_) => ErrorCategory::BackendFailure,
            EngineError::Corrupt(_) => ErrorCategory::Corrupt,
            EngineError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<oj_storage::StorageError> for EngineError {
    fn from(e: oj_storage::StorageError) -> Self {
        match e.category() {
            ErrorCategory::NotFound => EngineError::NotFound(e.to_string()),
            ErrorCategory::PreconditionFailed => EngineError::PreconditionFailed(e.to_string()),
            ErrorCategory::LockContention => EngineError::LockContention(e.to_string()),
            ErrorCategory::BackendFailure => EngineError::BackendFailure(e.to_string()),
            ErrorCategory::Corrupt => EngineError::Corrupt(e.to_string()),
            ErrorCategory::Internal => EngineError::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
