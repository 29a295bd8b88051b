//! Workflow: the immutable graph definition for a task (spec §3 "Workflow").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::task::TaskId;

crate::define_id! {
    /// Identifier for a [`Workflow`]. 1:1 with a [`TaskId`].
    pub struct WorkflowId("wf-");
}

crate::define_id! {
    /// Identifier for a [`Node`] within a workflow.
    pub struct NodeId("node-");
}

crate::define_id! {
    /// Identifier for an [`Edge`] within a workflow.
    pub struct EdgeId("edge-");
}

/// Node kind (spec §3 Node, §4.9 dispatch table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Task,
    Condition,
    Loop,
    Human,
    Switch,
    Assign,
    Script,
    Foreach,
}

crate::simple_display! {
    NodeType {
        Start => "start",
        End => "end",
        Task => "task",
        Condition => "condition",
        Loop => "loop",
        Human => "human",
        Switch => "switch",
        Assign => "assign",
        Script => "script",
        Foreach => "foreach",
    }
}

/// Per-node-type payload (spec §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodePayload {
    Start,
    End,
    /// LLM invocation: prompt template + optional persona, per-node timeout.
    Task {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        persona: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Boolean expression; successors chosen by matching edge condition.
    Condition { expression: String },
    /// Loop-guard expression, evaluated against the current loop count via
    /// the `index`/`total` eval-context bindings (spec §4.10).
    Loop { expression: String },
    /// Waits for an external `resumeWaitingJob` call (spec §4.9 human row).
    Human {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    /// Value expression; successor matches the edge whose condition equals
    /// the value, falling back to an edge with no condition.
    Switch { expression: String },
    /// Dotted-path assignments applied to instance variables.
    Assign { assignments: Vec<(String, String)> },
    /// Pure expression, result stored as the node's output.
    Script { expression: String },
    /// Iterates `items_expression`, dispatching body nodes per item.
    Foreach { items_expression: String },
}

impl NodePayload {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodePayload::Start => NodeType::Start,
            NodePayload::End => NodeType::End,
            NodePayload::Task { .. } => NodeType::Task,
            NodePayload::Condition { .. } => NodeType::Condition,
            NodePayload::Loop { .. } => NodeType::Loop,
            NodePayload::Human { .. } => NodeType::Human,
            NodePayload::Switch { .. } => NodeType::Switch,
            NodePayload::Assign { .. } => NodeType::Assign,
            NodePayload::Script { .. } => NodeType::Script,
            NodePayload::Foreach { .. } => NodeType::Foreach,
        }
    }
}

/// Retry policy attached to a node (spec §4.9 "Retry policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub payload: NodePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl Node {
    pub fn new(name: impl Into<String>, payload: NodePayload) -> Self {
        Self { id: NodeId::new(), name: name.into(), payload, retry: None }
    }

    pub fn node_type(&self) -> NodeType {
        self.payload.node_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { id: EdgeId::new(), from, to, condition: None, max_iterations: None }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }
}

/// Immutable (append-only) graph definition for a [`crate::task::Task`]
/// (spec §3 "Workflow").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub task_id: TaskId,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Workflow {
    pub fn new(task_id: TaskId, now_ms: u64) -> Self {
        Self {
            id: WorkflowId::new(),
            task_id,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: HashMap::new(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Edges whose `to` is `node_id` (predecessors).
    pub fn incoming_edges(&self, node_id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.to == node_id)
    }

    /// Edges whose `from` is `node_id` (successors).
    pub fn outgoing_edges(&self, node_id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.from == node_id)
    }

    /// Start nodes: those with no incoming edges and type `Start`.
    pub fn start_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.node_type() == NodeType::Start)
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
