//! Job: one execution attempt of one node, the queue's unit (spec §3 "Job").

use serde::{Deserialize, Serialize};

use crate::instance::InstanceId;
use crate::task::TaskId;
use crate::workflow::{NodeId, WorkflowId};

/// `instanceId:nodeId:attempt` (spec §3). Deliberately not a random id:
/// re-enqueuing the same tuple must replace the same job (§8 P1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(instance_id: InstanceId, node_id: NodeId, attempt: u32) -> Self {
        Self(format!("{instance_id}:{node_id}:{attempt}"))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status (spec §3). `Delayed` is never assigned directly — it is a
/// derived view over `Waiting` jobs whose `process_at_ms` is in the future
/// (spec §4.7 `getQueueStats`: "delayed = waiting with processAt>now").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    HumanWaiting,
}

crate::simple_display! {
    JobStatus {
        Waiting => "waiting",
        Active => "active",
        Completed => "completed",
        Failed => "failed",
        Delayed => "delayed",
        HumanWaiting => "human_waiting",
    }
}

/// The payload carried by a job (spec §3: "instance id, node id, attempt
/// number, workflow id, task id, persona, prompt reference").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    pub instance_id: InstanceId,
    pub node_id: NodeId,
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub data: JobData,
    pub status: JobStatus,
    pub priority: i32,
    pub process_at_ms: u64,
    pub created_at_ms: u64,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

/// Default retry budget (spec §3 "max-attempts (3 by default)").
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

impl Job {
    pub fn new(data: JobData, priority: i32, process_at_ms: u64, created_at_ms: u64) -> Self {
        let id = JobId::new(data.instance_id, data.node_id, data.attempt);
        Self {
            id,
            attempt: data.attempt,
            data,
            status: JobStatus::Waiting,
            priority,
            process_at_ms,
            created_at_ms,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            error: None,
            completed_at_ms: None,
        }
    }

    /// Whether this job is ready to be dequeued right now (spec §4.7 ordering:
    /// "processAt in the future excludes a job from selection").
    pub fn is_ready(&self, now_ms: u64) -> bool {
        self.status == JobStatus::Waiting && self.process_at_ms <= now_ms
    }

    /// Exponential backoff delay before attempt `attempt + 1`
    /// (spec §3: "next processAt = now + 2^attempts · 1s").
    pub fn backoff_ms(attempt: u32) -> u64 {
        2u64.saturating_pow(attempt) * 1_000
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
