//! Test builders shared by other crates (feature `test-support`).

use std::collections::HashMap;

use crate::instance::Instance;
use crate::task::{Task, TaskId};
use crate::workflow::{Edge, Node, NodePayload, Workflow};

/// A linear `start -> a -> b -> end` workflow, handy for engine/storage tests.
pub fn linear_workflow(task_id: TaskId, now_ms: u64) -> Workflow {
    let mut wf = Workflow::new(task_id, now_ms);
    let start = Node::new("start", NodePayload::Start);
    let a = Node::new("a", NodePayload::Task { prompt: "do a".into(), persona: None, timeout_ms: None });
    let b = Node::new("b", NodePayload::Task { prompt: "do b".into(), persona: None, timeout_ms: None });
    let end = Node::new("end", NodePayload::End);
    let (start_id, a_id, b_id, end_id) = (start.id, a.id, b.id, end.id);
    wf.nodes = vec![start, a, b, end];
    wf.edges = vec![
        Edge::new(start_id, a_id),
        Edge::new(a_id, b_id),
        Edge::new(b_id, end_id),
    ];
    wf
}

pub fn test_task(now_ms: u64) -> Task {
    Task::new("scratch task", "exercise the engine", "/tmp/scratch", now_ms)
}

pub fn fresh_instance(wf: &Workflow) -> Instance {
    let node_ids: Vec<_> = wf.nodes.iter().map(|n| n.id).collect();
    Instance::new(wf.id, &node_ids, HashMap::new())
}
