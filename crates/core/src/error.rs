//! The error taxonomy surfaced to callers (spec §7).
//!
//! Every crate in the workspace defines its own `thiserror` error enum for
//! its own failure modes, but each variant maps onto one of these
//! categories so callers at any boundary can make the same handful of
//! decisions: retry, report, or treat as a bug.

use serde::{Deserialize, Serialize};

/// The six error categories a conforming implementation surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Task/workflow/instance missing.
    NotFound,
    /// Status machine violation (e.g. pause a terminal task).
    PreconditionFailed,
    /// Could not acquire the queue lock within budget; caller may retry.
    LockContention,
    /// The LLM adapter returned process/timeout/cancelled.
    BackendFailure,
    /// A persisted document could not be parsed.
    Corrupt,
    /// Unexpected invariant violation.
    Internal,
}

crate::simple_display! {
    ErrorCategory {
        NotFound => "not_found",
        PreconditionFailed => "precondition_failed",
        LockContention => "lock_contention",
        BackendFailure => "backend_failure",
        Corrupt => "corrupt",
        Internal => "internal",
    }
}

/// A category-tagged error, used as the uniform boundary error between
/// crates that don't otherwise share an error type (e.g. what the engine
/// hands back to a caller after classifying a storage or adapter failure).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{category}: {message}")]
pub struct CoreError {
    pub category: ErrorCategory,
    pub message: String,
}

impl CoreError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::PreconditionFailed, message)
    }

    pub fn lock_contention(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::LockContention, message)
    }

    pub fn backend_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::BackendFailure, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Corrupt, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, message)
    }

    /// Whether the worker should retry locally rather than surface the
    /// failure as a node/workflow failure event (§7 propagation policy).
    pub fn is_locally_retryable(&self) -> bool {
        matches!(self.category, ErrorCategory::LockContention | ErrorCategory::BackendFailure)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
