//! oj-storage: the on-disk layout and durable stores (spec §4.1-4.5, 4.7).
//!
//! No in-memory caching and no write-ahead log: every read hits disk and
//! every write is an atomic rename. Cross-process coordination happens
//! only through the file lock in [`lock`], never through shared memory.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod atomic;
pub mod error;
pub mod lock;
pub mod paths;
pub mod pid_lock;
pub mod queue;
pub mod task_store;
pub mod trace_store;
pub mod workflow_store;

pub use error::StorageError;
pub use lock::FileLock;
pub use paths::DataRoot;
pub use pid_lock::{PidLock, PidLockInfo};
pub use queue::{Queue, QueueStats};
pub use task_store::{TaskFilter, TaskStore, TaskSummary};
pub use trace_store::{TraceStore, TraceSummary};
pub use workflow_store::WorkflowStore;
