//! State manager (spec §4.11): after every node-state change, compute the
//! set of newly-ready nodes, detect unreachable nodes that must be marked
//! skipped, and detect instance terminal states.
//!
//! Grounded on the teacher's `crates/engine/src/decision_builder.rs`
//! (deciding the next set of effects from a state snapshot) and
//! `crates/engine/src/runtime/handlers/lifecycle.rs` (terminal-state
//! detection), generalized from a linear job to the full node graph.

use std::collections::{HashSet, VecDeque};

use oj_core::{EventPayload, Instance, InstanceStatus, Node, NodeId, NodePayload, NodeStatus, NodeType, Progress, Workflow};
use serde_json::Value;

use crate::eval::{node_states_by_name, outputs_by_name, to_str, EvalContext};

/// Whether an edge "fires" out of a just-finished node, and whether that
/// makes its target reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    /// Source done, this edge is one the source node actually takes.
    Active,
    /// Source done, but this edge's condition did not match — the target
    /// is not reached via this edge (spec §4.9 condition/switch row).
    Inactive,
    /// Source terminal but produced no path (failed, or skipped itself).
    Blocked,
    /// Source not yet terminal.
    Pending,
}

/// Outcome of reconciling the graph after one node's transition.
#[derive(Debug, Default, Clone)]
pub struct Advance {
    pub newly_ready: Vec<NodeId>,
    pub newly_skipped: Vec<NodeId>,
}

pub struct StateManager;

impl StateManager {
    /// Nodes with no incoming edges: enqueued when an instance starts
    /// (spec §2 "enqueues all initially-ready nodes").
    pub fn initial_nodes(workflow: &Workflow) -> Vec<NodeId> {
        workflow
            .nodes
            .iter()
            .filter(|n| workflow.incoming_edges(&n.id).next().is_none())
            .map(|n| n.id)
            .collect()
    }

    /// Which of this node's outgoing edges are "active" (the ones the node
    /// actually follows), given the node's own recorded output. Loop nodes
    /// are a special case the caller (the node executor) resolves itself,
    /// since firing the loop-back edge requires mutating the edge's loop
    /// counter; this function treats all of a loop node's outgoing edges
    /// as active only when called after the executor has made that choice
    /// (encoded by the caller passing the single already-chosen edge list).
    fn active_edges<'a>(workflow: &'a Workflow, instance: &Instance, node: &'a Node) -> Vec<&'a oj_core::Edge> {
        let outgoing: Vec<&oj_core::Edge> = workflow.outgoing_edges(&node.id).collect();
        match &node.payload {
            NodePayload::Condition { .. } => {
                let output = instance.outputs.get(&node.id).map(crate::eval::to_bool).unwrap_or(false);
                let label = if output { "true" } else { "false" };
                let matched: Vec<&oj_core::Edge> =
                    outgoing.iter().copied().filter(|e| e.condition.as_deref() == Some(label)).collect();
                if matched.is_empty() {
                    outgoing
                } else {
                    matched
                }
            }
            NodePayload::Switch { .. } => {
                let output = instance.outputs.get(&node.id).cloned().unwrap_or(Value::Null);
                let value = to_str(&output);
                let matched: Vec<&oj_core::Edge> =
                    outgoing.iter().copied().filter(|e| e.condition.as_deref() == Some(value.as_str())).collect();
                if matched.is_empty() {
                    outgoing.into_iter().filter(|e| e.condition.is_none()).collect()
                } else {
                    matched
                }
            }
            _ => outgoing,
        }
    }

    fn edge_state(workflow: &Workflow, instance: &Instance, edge: &oj_core::Edge) -> EdgeState {
        let Some(state) = instance.node_states.get(&edge.from) else { return EdgeState::Pending };
        match state.status {
            NodeStatus::Done => {
                let Some(source) = workflow.node(&edge.from) else { return EdgeState::Blocked };
                if Self::active_edges(workflow, instance, source).iter().any(|e| e.id == edge.id) {
                    EdgeState::Active
                } else {
                    EdgeState::Inactive
                }
            }
            NodeStatus::Skipped | NodeStatus::Failed => EdgeState::Blocked,
            _ => EdgeState::Pending,
        }
    }

    /// A node is ready iff every incoming edge is either active (source
    /// done and took this edge) or blocked (source skipped/failed), and at
    /// least one incoming edge is active (spec §4.11, §8 P7).
    fn readiness(workflow: &Workflow, instance: &Instance, node_id: &NodeId) -> Option<bool> {
        let incoming: Vec<&oj_core::Edge> = workflow.incoming_edges(node_id).collect();
        if incoming.is_empty() {
            return Some(false); // handled by `initial_nodes`
        }
        let mut any_active = false;
        for edge in &incoming {
            match Self::edge_state(workflow, instance, edge) {
                EdgeState::Active => any_active = true,
                EdgeState::Blocked => {}
                EdgeState::Inactive => return Some(false),
                EdgeState::Pending => return None,
            }
        }
        Some(any_active)
    }

    /// Recompute the graph's frontier after `node_id` transitioned to a
    /// terminal (for this attempt) status: which newly-pending nodes
    /// became ready, and which became permanently unreachable (skipped).
    pub fn advance(workflow: &Workflow, instance: &Instance, node_id: &NodeId) -> Advance {
        let mut advance = Advance::default();
        let mut frontier: VecDeque<NodeId> = VecDeque::new();
        for edge in workflow.outgoing_edges(node_id) {
            frontier.push_back(edge.to);
        }
        let mut seen: HashSet<NodeId> = HashSet::new();

        while let Some(candidate) = frontier.pop_front() {
            if !seen.insert(candidate) {
                continue;
            }
            let Some(state) = instance.node_states.get(&candidate) else { continue };
            if state.status != NodeStatus::Pending {
                continue;
            }
            match Self::readiness(workflow, instance, &candidate) {
                Some(true) => advance.newly_ready.push(candidate),
                Some(false) => {
                    advance.newly_skipped.push(candidate);
                    for edge in workflow.outgoing_edges(&candidate) {
                        frontier.push_back(edge.to);
                    }
                }
                None => {}
            }
        }
        advance
    }

    /// `true` when every path from `node_id` to any `end` node is now
    /// unreachable — used to decide whether a failed node should fail the
    /// whole instance (spec §4.11 "If the failed node is on every path to
    /// end...").
    pub fn blocks_all_paths_to_end(workflow: &Workflow, node_id: &NodeId) -> bool {
        let ends: Vec<NodeId> = workflow.nodes.iter().filter(|n| n.node_type() == NodeType::End).map(|n| n.id).collect();
        if ends.is_empty() {
            return false;
        }
        for end in &ends {
            if path_exists_avoiding(workflow, node_id, end, node_id) {
                return false;
            }
        }
        true
    }

    /// Terminal status for the instance, if every node has reached a
    /// terminal status for this run (spec §4.11, §3 Instance invariant).
    pub fn terminal_status(workflow: &Workflow, instance: &Instance) -> Option<InstanceStatus> {
        let mut any_failed = false;
        for node in &workflow.nodes {
            let Some(state) = instance.node_states.get(&node.id) else { return None };
            match state.status {
                NodeStatus::Done | NodeStatus::Skipped => {}
                NodeStatus::Failed => any_failed = true,
                NodeStatus::Waiting => return None,
                NodeStatus::Pending | NodeStatus::Ready | NodeStatus::Running => return None,
            }
        }
        Some(if any_failed { InstanceStatus::Failed } else { InstanceStatus::Completed })
    }

    /// `progress(instance, workflow) = {total, completed, percentage}` (spec §4.11).
    pub fn progress(workflow: &Workflow, instance: &Instance) -> Progress {
        let total = workflow.nodes.len() as u32;
        let completed = workflow
            .nodes
            .iter()
            .filter(|n| {
                instance
                    .node_states
                    .get(&n.id)
                    .map(|s| matches!(s.status, NodeStatus::Done | NodeStatus::Skipped | NodeStatus::Failed))
                    .unwrap_or(false)
            })
            .count() as u32;
        let percentage = if total == 0 { 100.0 } else { (completed as f32 / total as f32) * 100.0 };
        Progress { total, completed, percentage }
    }

    pub fn progress_event(workflow: &Workflow, instance: &Instance) -> EventPayload {
        EventPayload::WorkflowProgress { instance_id: instance.id, progress: Self::progress(workflow, instance) }
    }

    /// Build the evaluator context for one node's condition/switch/assign/
    /// script expression (spec §4.10).
    pub fn eval_context<'a>(workflow: &Workflow, instance: &'a Instance, now_ms: u64) -> EvalContext<'a> {
        EvalContext::new(&instance.variables, now_ms)
            .with_outputs(outputs_by_name(workflow, &instance.outputs))
            .with_node_states(node_states_by_name(workflow, &instance.node_states))
    }
}

/// Depth-limited reachability check: is there a path from `from` to `to`
/// that does not pass through `avoid` (except as the starting node)?
fn path_exists_avoiding(workflow: &Workflow, from: &NodeId, to: &NodeId, avoid: &NodeId) -> bool {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![*from];
    while let Some(current) = stack.pop() {
        if &current == to {
            return true;
        }
        if &current != from && &current == avoid {
            continue;
        }
        if !visited.insert(current) {
            continue;
        }
        for edge in workflow.outgoing_edges(&current) {
            stack.push(edge.to);
        }
    }
    false
}

#[cfg(test)]
#[path = "state_manager_tests.rs"]
mod tests;
