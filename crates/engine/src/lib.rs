//! oj-engine: the workflow execution engine (spec §4.6-§4.13).
//!
//! Owns the pieces the storage crate doesn't: the event bus, the
//! expression evaluator, the node executor, the state manager that
//! reconciles the graph after every node transition, the worker pool that
//! drives the queue, crash recovery, and the task lifecycle API.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod engine;
pub mod error;
pub mod eval;
pub mod event_bus;
pub mod executor;
pub mod lifecycle;
pub mod reconcile;
pub mod recovery;
pub mod state_manager;
pub mod worker;

pub use engine::Engine;
pub use error::{EngineError, Result};
pub use event_bus::{EventBus, EventHandler};
pub use executor::{NodeExecutor, NodeOutcome, DEFAULT_NODE_TIMEOUT_MS};
pub use lifecycle::Lifecycle;
pub use recovery::Orphan;
pub use state_manager::{Advance, StateManager};
pub use worker::{InstanceTokens, Worker, WorkerConfig};
