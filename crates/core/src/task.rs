//! Task: the user-facing unit of work (spec §3 "Task").

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier for a [`Task`].
    pub struct TaskId("task-");
}

/// Submission priority. Higher priority jobs are dequeued first (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Signed integer used as the queue's sort key (higher first).
    pub fn weight(self) -> i32 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 10,
            Priority::High => 20,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

crate::simple_display! {
    Priority {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

/// Task status machine (spec §3):
/// `pending -> planning -> developing <-> paused -> reviewing -> {completed, failed, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Planning,
    Developing,
    Paused,
    Reviewing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Whether `pause` may be called from this status (§4.13: precondition `status=developing`).
    pub fn can_pause(self) -> bool {
        matches!(self, TaskStatus::Developing)
    }

    /// Whether `resume` may be called from this status.
    pub fn can_resume(self) -> bool {
        matches!(self, TaskStatus::Paused)
    }

    /// Whether `stop` may be called from this status (§4.13: precondition "not terminal").
    pub fn can_stop(self) -> bool {
        !self.is_terminal()
    }

    /// Whether `complete`/`reject` may be called (§4.13: precondition `status=reviewing`).
    pub fn can_review(self) -> bool {
        matches!(self, TaskStatus::Reviewing)
    }
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Planning => "planning",
        Developing => "developing",
        Paused => "paused",
        Reviewing => "reviewing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Owner record for a running task (§3 "Process-info").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Stopped,
    Exited,
}

crate::simple_display! {
    ProcessStatus {
        Running => "running",
        Stopped => "stopped",
        Exited => "exited",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub started_at_ms: u64,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl ProcessInfo {
    pub fn running(pid: u32, started_at_ms: u64) -> Self {
        Self { pid, started_at_ms, status: ProcessStatus::Running, stop_reason: None }
    }
}

/// User-facing unit of work (spec §3 "Task").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, working_dir: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: description.into(),
            priority: Priority::default(),
            status: TaskStatus::Pending,
            working_dir: working_dir.into(),
            assignee: None,
            model: None,
            retry_count: 0,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            parent_task_id: None,
            reject_reason: None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
