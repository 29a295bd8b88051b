//! Instance: runtime state of one workflow execution (spec §3 "Instance").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::workflow::{EdgeId, NodeId, WorkflowId};

crate::define_id! {
    /// Identifier for an [`Instance`]. 1:1 with a [`WorkflowId`].
    pub struct InstanceId("inst-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl InstanceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Failed | InstanceStatus::Cancelled)
    }
}

crate::simple_display! {
    InstanceStatus {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Per-node runtime status (spec §3 "Node state").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    Skipped,
    Waiting,
}

impl NodeStatus {
    /// `status done|failed|skipped|waiting is terminal for that attempt` (spec §3).
    pub fn is_attempt_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Done | NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Waiting
        )
    }
}

crate::simple_display! {
    NodeStatus {
        Pending => "pending",
        Ready => "ready",
        Running => "running",
        Done => "done",
        Failed => "failed",
        Skipped => "skipped",
        Waiting => "waiting",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub status: NodeStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_handle: Option<String>,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Pending
    }
}

impl NodeState {
    pub fn pending() -> Self {
        Self::default()
    }
}

/// Metadata recorded when a task/instance is paused (spec §4.13 "pause").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseInfo {
    pub paused_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Runtime execution state for a [`crate::workflow::Workflow`]
/// (spec §3 "Instance").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub workflow_id: WorkflowId,
    pub status: InstanceStatus,
    #[serde(default)]
    pub node_states: HashMap<NodeId, NodeState>,
    #[serde(default)]
    pub loop_counts: HashMap<EdgeId, u32>,
    #[serde(default)]
    pub outputs: HashMap<NodeId, serde_json::Value>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<PauseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Instance {
    pub fn new(workflow_id: WorkflowId, nodes: &[NodeId], variables: HashMap<String, serde_json::Value>) -> Self {
        Self {
            id: InstanceId::new(),
            workflow_id,
            status: InstanceStatus::Pending,
            node_states: nodes.iter().map(|id| (*id, NodeState::pending())).collect(),
            loop_counts: HashMap::new(),
            outputs: HashMap::new(),
            variables,
            started_at_ms: None,
            completed_at_ms: None,
            pause: None,
            error: None,
        }
    }

    /// `instance.status = paused ⇒ no node has status running` (spec §3 invariant).
    pub fn pause_invariant_holds(&self) -> bool {
        if self.status != InstanceStatus::Paused {
            return true;
        }
        !self.node_states.values().any(|s| s.status == NodeStatus::Running)
    }

    /// Set a (possibly dotted) path within `variables`, creating intermediate
    /// objects as needed (spec §4.4 "updateInstanceVariables ... dotted-path support").
    pub fn set_variable_path(&mut self, path: &str, value: serde_json::Value) {
        set_dotted(&mut self.variables, path, value);
    }

    pub fn get_variable_path(&self, path: &str) -> Option<&serde_json::Value> {
        get_dotted_map(&self.variables, path)
    }
}

fn set_dotted(root: &mut HashMap<String, serde_json::Value>, path: &str, value: serde_json::Value) {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else { return };
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        root.insert(first.to_string(), value);
        return;
    }
    let entry = root
        .entry(first.to_string())
        .or_insert_with(|| serde_json::Value::Object(Default::default()));
    set_dotted_value(entry, &rest, value);
}

fn set_dotted_value(node: &mut serde_json::Value, rest: &[&str], value: serde_json::Value) {
    if !node.is_object() {
        *node = serde_json::Value::Object(Default::default());
    }
    let obj = node.as_object_mut().expect("just coerced to object");
    if rest.len() == 1 {
        obj.insert(rest[0].to_string(), value);
        return;
    }
    let next = obj
        .entry(rest[0].to_string())
        .or_insert_with(|| serde_json::Value::Object(Default::default()));
    set_dotted_value(next, &rest[1..], value);
}

fn get_dotted_map<'a>(root: &'a HashMap<String, serde_json::Value>, path: &str) -> Option<&'a serde_json::Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = root.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
