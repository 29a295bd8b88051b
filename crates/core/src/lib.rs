//! oj-core: data model and shared primitives for the task orchestrator.
//!
//! This crate has no I/O. It defines the entities in the data model
//! (Task, Workflow, Instance, Node, Edge, Job, TraceSpan, ProcessInfo),
//! the error taxonomy every other crate maps into, and small testable
//! abstractions (ids, clock) that the storage and engine crates build on.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod macros;

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod instance;
pub mod job;
pub mod task;
pub mod trace;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::CoreError;
pub use event::{EventName, EventPayload, Progress};
pub use id::short;
pub use instance::{Instance, InstanceId, InstanceStatus, NodeState, NodeStatus, PauseInfo};
pub use job::{Job, JobData, JobId, JobStatus};
pub use task::{ProcessInfo, ProcessStatus, Priority, Task, TaskId, TaskStatus};
pub use trace::{ErrorCategory, SpanError, SpanId, SpanKind, SpanStatus, TokenUsage, TraceId, TraceSpan};
pub use workflow::{Edge, EdgeId, Node, NodeId, NodePayload, NodeType, RetryPolicy, Workflow, WorkflowId};
