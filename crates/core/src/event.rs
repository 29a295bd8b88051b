//! Named events emitted onto the event bus (spec §4.6).
//!
//! The spec lists event *names* only ("a non-exhaustive list"); SPEC_FULL
//! §C.3 pins each to a small payload struct so subscribers get
//! compile-time checked fields instead of a free-form map.

use serde::{Deserialize, Serialize};

use crate::instance::InstanceId;
use crate::task::TaskId;
use crate::workflow::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    WorkflowStarted,
    WorkflowProgress,
    WorkflowCompleted,
    WorkflowFailed,
    NodeStarted,
    NodeCompleted,
    NodeFailed,
    TaskCreated,
    TaskStarted,
    TaskPaused,
    TaskResumed,
    TaskStopped,
    TaskCompleted,
    TaskFailed,
}

crate::simple_display! {
    EventName {
        WorkflowStarted => "workflow:started",
        WorkflowProgress => "workflow:progress",
        WorkflowCompleted => "workflow:completed",
        WorkflowFailed => "workflow:failed",
        NodeStarted => "node:started",
        NodeCompleted => "node:completed",
        NodeFailed => "node:failed",
        TaskCreated => "task:created",
        TaskStarted => "task:started",
        TaskPaused => "task:paused",
        TaskResumed => "task:resumed",
        TaskStopped => "task:stopped",
        TaskCompleted => "task:completed",
        TaskFailed => "task:failed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub total: u32,
    pub completed: u32,
    pub percentage: f32,
}

/// Typed payload for one emitted event (spec §4.6, SPEC_FULL §C.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum EventPayload {
    WorkflowStarted { instance_id: InstanceId },
    WorkflowProgress { instance_id: InstanceId, progress: Progress },
    WorkflowCompleted { instance_id: InstanceId },
    WorkflowFailed { instance_id: InstanceId, error: String },
    NodeStarted { instance_id: InstanceId, node_id: NodeId, attempt: u32 },
    NodeCompleted { instance_id: InstanceId, node_id: NodeId },
    NodeFailed { instance_id: InstanceId, node_id: NodeId, error: String },
    TaskCreated { task_id: TaskId },
    TaskStarted { task_id: TaskId },
    TaskPaused { task_id: TaskId, reason: Option<String> },
    TaskResumed { task_id: TaskId },
    TaskStopped { task_id: TaskId, reason: Option<String> },
    TaskCompleted { task_id: TaskId },
    TaskFailed { task_id: TaskId, error: String },
}

impl EventPayload {
    pub fn name(&self) -> EventName {
        match self {
            EventPayload::WorkflowStarted { .. } => EventName::WorkflowStarted,
            EventPayload::WorkflowProgress { .. } => EventName::WorkflowProgress,
            EventPayload::WorkflowCompleted { .. } => EventName::WorkflowCompleted,
            EventPayload::WorkflowFailed { .. } => EventName::WorkflowFailed,
            EventPayload::NodeStarted { .. } => EventName::NodeStarted,
            EventPayload::NodeCompleted { .. } => EventName::NodeCompleted,
            EventPayload::NodeFailed { .. } => EventName::NodeFailed,
            EventPayload::TaskCreated { .. } => EventName::TaskCreated,
            EventPayload::TaskStarted { .. } => EventName::TaskStarted,
            EventPayload::TaskPaused { .. } => EventName::TaskPaused,
            EventPayload::TaskResumed { .. } => EventName::TaskResumed,
            EventPayload::TaskStopped { .. } => EventName::TaskStopped,
            EventPayload::TaskCompleted { .. } => EventName::TaskCompleted,
            EventPayload::TaskFailed { .. } => EventName::TaskFailed,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
