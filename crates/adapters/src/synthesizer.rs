//! Workflow synthesizer (spec §6): given a task description, produce a
//! [`Workflow`]. No 1:1 teacher file — the teacher embeds one HCL parser
//! in-process rather than exposing this as a swappable interface — so
//! this trait is new, grounded on the same adapter-trait-plus-fake
//! pattern as [`crate::backend::Backend`].

use async_trait::async_trait;
use oj_core::{TaskId, Workflow};

/// The core consumes a [`Workflow`] but never synthesizes one itself
/// (spec §6 "The engine does not synthesize itself; it consumes").
#[async_trait]
pub trait WorkflowSynthesizer: Send + Sync {
    async fn synthesize(&self, task_id: TaskId, description: &str, now_ms: u64) -> Workflow;
}

/// Deterministic fake: always returns the fixed linear `start -> task ->
/// end` shape, ignoring the description. Useful for engine/daemon tests
/// that only need *a* valid workflow, not a realistic one.
pub struct FakeSynthesizer;

#[async_trait]
impl WorkflowSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, task_id: TaskId, description: &str, now_ms: u64) -> Workflow {
        use oj_core::{Edge, Node, NodePayload};

        let mut workflow = Workflow::new(task_id, now_ms);
        let start = Node::new("start", NodePayload::Start);
        let task_node = Node::new("task", NodePayload::Task { prompt: description.to_string(), persona: None, timeout_ms: None });
        let end = Node::new("end", NodePayload::End);
        let (start_id, task_node_id, end_id) = (start.id, task_node.id, end.id);
        workflow.nodes = vec![start, task_node, end];
        workflow.edges = vec![Edge::new(start_id, task_node_id), Edge::new(task_node_id, end_id)];
        workflow
    }
}

#[cfg(test)]
#[path = "synthesizer_tests.rs"]
mod tests;
