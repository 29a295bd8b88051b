//! Approval front-end (spec §6): observes human-type nodes and resolves
//! them. New trait — no 1:1 teacher file — grounded on the same
//! adapter-trait-plus-fake pattern as [`crate::backend::Backend`].

use async_trait::async_trait;
use oj_core::JobId;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Outcome of a human review (spec §4.13 `complete`/`reject`).
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalDecision {
    Approve,
    Reject { reason: String },
}

/// Observes `node:started` for human-type nodes (via the event bus) or
/// polls `getWaitingHumanJobs`, then resolves the job (spec §6).
#[async_trait]
pub trait ApprovalFront: Send + Sync {
    async fn decide(&self, job_id: &JobId) -> ApprovalDecision;
}

/// Scripted fake: replays queued decisions, defaulting to approval when
/// the queue is drained.
pub struct FakeApprovalFront {
    decisions: Mutex<VecDeque<ApprovalDecision>>,
}

impl Default for FakeApprovalFront {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApprovalFront {
    pub fn new() -> Self {
        Self { decisions: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, decision: ApprovalDecision) {
        self.decisions.lock().push_back(decision);
    }
}

#[async_trait]
impl ApprovalFront for FakeApprovalFront {
    async fn decide(&self, _job_id: &JobId) -> ApprovalDecision {
        self.decisions.lock().pop_front().unwrap_or(ApprovalDecision::Approve)
    }
}

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;
