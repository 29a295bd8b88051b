//! Storage error taxonomy (maps onto spec §7).

use oj_core::error::ErrorCategory;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("lock acquisition exceeded retries: {0}")]
    LockContention(String),

    #[error("corrupt document at {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("io error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StorageError::NotFound(_) => ErrorCategory::NotFound,
            StorageError::PreconditionFailed(_) => ErrorCategory::PreconditionFailed,
            StorageError::LockContention(_) => ErrorCategory::LockContention,
            StorageError::Corrupt { .. } => ErrorCategory::Corrupt,
            StorageError::Io { .. } => ErrorCategory::Internal,
            StorageError::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io { path: path.into(), source }
    }

    pub fn corrupt(path: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Corrupt { path: path.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
