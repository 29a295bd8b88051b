//! Node executor (spec §4.9): evaluates one node of one instance.
//!
//! Grounded on the teacher's `crates/engine/src/executor.rs` (per-effect
//! dispatch, a timer-backed timeout around the awaited work, a `tracing`
//! span per unit of work) generalized from the teacher's single "spawn an
//! agent" effect to the full node-type dispatch table in §4.9.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use oj_adapters::{Backend, BackendError, InvokeRequest};
use oj_core::{ErrorCategory, Instance, Node, NodePayload, NodeStatus, TaskId, Workflow};
use oj_storage::WorkflowStore;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::eval::{evaluate, evaluate_bool, to_str, EvalContext};
use crate::state_manager::StateManager;

/// Default per-node timeout for task nodes (spec §4.9 "default 30 min").
pub const DEFAULT_NODE_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Outcome of one node execution attempt (spec §4.9, §7 error taxonomy).
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Done { output: Value, variables: HashMap<String, Value> },
    Failed { error: String, category: ErrorCategory },
    Cancelled,
    /// Human node: the job was handed to the approval front-end and stays
    /// `human_waiting` until `resumeWaitingJob` (spec §4.9 human row).
    WaitingForHuman,
}

pub struct NodeExecutor<B: Backend + ?Sized> {
    backend: Arc<B>,
    workflow_store: Arc<WorkflowStore>,
}

impl<B: Backend + ?Sized> NodeExecutor<B> {
    pub fn new(backend: Arc<B>, workflow_store: Arc<WorkflowStore>) -> Self {
        Self { backend, workflow_store }
    }

    /// Execute `node` within `instance`, honoring `cancel` at the LLM
    /// invocation suspension point (spec §5 "Suspension points").
    pub async fn execute(
        &self,
        task_id: TaskId,
        workflow: &Workflow,
        instance: &Instance,
        node: &Node,
        attempt: u32,
        cwd: &str,
        now_ms: u64,
        cancel: CancellationToken,
    ) -> NodeOutcome {
        let ctx = StateManager::eval_context(workflow, instance, now_ms);
        match &node.payload {
            NodePayload::Start | NodePayload::End => NodeOutcome::Done { output: Value::Null, variables: HashMap::new() },

            NodePayload::Task { prompt, persona, timeout_ms } => {
                self.execute_task(prompt, persona.as_deref(), *timeout_ms, &ctx, cwd, attempt, cancel).await
            }

            NodePayload::Condition { expression } => {
                let value = evaluate_bool(expression, &ctx);
                NodeOutcome::Done { output: Value::Bool(value), variables: HashMap::new() }
            }

            NodePayload::Switch { expression } => match evaluate(expression, &ctx) {
                Ok(value) => NodeOutcome::Done { output: value, variables: HashMap::new() },
                Err(e) => NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Validation },
            },

            NodePayload::Assign { assignments } => {
                let mut variables = HashMap::new();
                for (path, expression) in assignments {
                    match evaluate(expression, &ctx) {
                        Ok(value) => {
                            variables.insert(path.clone(), value);
                        }
                        Err(e) => return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Validation },
                    }
                }
                NodeOutcome::Done { output: Value::Null, variables }
            }

            NodePayload::Script { expression } => match evaluate(expression, &ctx) {
                Ok(value) => NodeOutcome::Done { output: value, variables: HashMap::new() },
                Err(e) => NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Validation },
            },

            NodePayload::Human { .. } => NodeOutcome::WaitingForHuman,

            NodePayload::Loop { expression } => self.execute_loop(task_id, workflow, node, expression, &ctx).await,

            NodePayload::Foreach { items_expression } => {
                self.execute_foreach(task_id, workflow, instance, node, items_expression, cwd, now_ms, cancel).await
            }
        }
    }

    async fn execute_task(
        &self,
        prompt: &str,
        persona: Option<&str>,
        timeout_ms: Option<u64>,
        ctx: &EvalContext<'_>,
        cwd: &str,
        attempt: u32,
        cancel: CancellationToken,
    ) -> NodeOutcome {
        let rendered = render_prompt(prompt, persona, ctx);
        let timeout_ms = timeout_ms.unwrap_or(DEFAULT_NODE_TIMEOUT_MS);
        let request = InvokeRequest::new(rendered, cwd.to_string(), timeout_ms);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => NodeOutcome::Cancelled,
            result = self.backend.invoke(request) => match result {
                Ok(response) => NodeOutcome::Done {
                    output: serde_json::json!({ "_raw": response.response, "sessionId": response.session_id }),
                    variables: HashMap::new(),
                },
                Err(BackendError::Cancelled) => NodeOutcome::Cancelled,
                Err(BackendError::Timeout { timeout_ms }) => NodeOutcome::Failed {
                    error: format!("node timed out after {timeout_ms}ms (attempt {attempt})"),
                    category: ErrorCategory::Timeout,
                },
                Err(BackendError::Process { message, .. }) => {
                    NodeOutcome::Failed { error: message, category: ErrorCategory::Process }
                }
            },
        }
    }

    /// Loop node (spec §4.9 loop row): increment the loop-back edge's
    /// counter, decide continue-vs-exit, and reset the body's node state
    /// on re-entry ("this is not a retry").
    async fn execute_loop(
        &self,
        task_id: TaskId,
        workflow: &Workflow,
        node: &Node,
        expression: &str,
        ctx: &EvalContext<'_>,
    ) -> NodeOutcome {
        let outgoing: Vec<&oj_core::Edge> = workflow.outgoing_edges(&node.id).collect();
        let Some(loop_edge) = outgoing.iter().find(|e| e.max_iterations.is_some()) else {
            return NodeOutcome::Failed {
                error: format!("loop node {} has no loop-back edge (max_iterations unset)", node.id),
                category: ErrorCategory::Internal,
            };
        };
        let max = loop_edge.max_iterations.unwrap_or(u32::MAX);
        let count = match self.workflow_store.increment_loop_count(&task_id, &loop_edge.id) {
            Ok(count) => count,
            Err(e) => return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Internal },
        };

        let loop_ctx = EvalContext::new(ctx.variables, ctx.now_ms)
            .with_outputs(ctx.outputs.clone())
            .with_node_states(ctx.node_states.clone())
            .with_loop(count as i64, Value::Null, max as i64);
        let continues = count <= max && evaluate_bool(expression, &loop_ctx);

        if continues {
            for body_node in loop_body_nodes(workflow, node.id, loop_edge.to) {
                if let Err(e) = self.workflow_store.reset_node_state(&task_id, &body_node) {
                    return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Internal };
                }
            }
        }
        NodeOutcome::Done { output: Value::Bool(continues), variables: HashMap::new() }
    }

    /// Foreach node (spec §4.9 foreach row). Simplification (see
    /// DESIGN.md): the body is the single node reached by the foreach
    /// node's first outgoing edge, run once per item; the body node's
    /// final state/output is what the normal ready-set computation sees
    /// afterwards, so the graph continues past the body exactly as if it
    /// had run once. Per-item results are collected on the foreach node's
    /// own output.
    async fn execute_foreach(
        &self,
        task_id: TaskId,
        workflow: &Workflow,
        instance: &Instance,
        node: &Node,
        items_expression: &str,
        cwd: &str,
        now_ms: u64,
        cancel: CancellationToken,
    ) -> NodeOutcome {
        let ctx = StateManager::eval_context(workflow, instance, now_ms);
        let items = match evaluate(items_expression, &ctx) {
            Ok(value) => value,
            Err(e) => return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Validation },
        };
        let Some(items) = items.as_array().cloned() else {
            return NodeOutcome::Failed {
                error: format!("foreach expression did not evaluate to an array: {items}"),
                category: ErrorCategory::Validation,
            };
        };
        let Some(body_edge) = workflow.outgoing_edges(&node.id).next() else {
            return NodeOutcome::Done { output: Value::Array(items), variables: HashMap::new() };
        };
        let Some(body_node) = workflow.node(&body_edge.to).cloned() else {
            return NodeOutcome::Failed { error: format!("foreach body node {} missing", body_edge.to), category: ErrorCategory::Internal };
        };

        let total = items.len() as i64;
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if let Err(e) = self.workflow_store.reset_node_state(&task_id, &body_node.id) {
                return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Internal };
            }
            let iter_ctx = StateManager::eval_context(workflow, instance, now_ms).with_loop(index as i64, item.clone(), total);

            let outcome = self.execute_body_node(&body_node, &iter_ctx, cwd, cancel.clone()).await;
            match outcome {
                NodeOutcome::Done { output, .. } => {
                    results.push(output.clone());
                    if let Err(e) = self.workflow_store.set_node_output(&task_id, &body_node.id, output) {
                        return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Internal };
                    }
                    let update = self.workflow_store.update_node_state(&task_id, &body_node.id, |s| {
                        s.status = NodeStatus::Done;
                        s.attempts += 1;
                        s.completed_at_ms = Some(now_ms);
                        s.error = None;
                    });
                    if let Err(e) = update {
                        return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Internal };
                    }
                }
                NodeOutcome::Cancelled => return NodeOutcome::Cancelled,
                failed @ NodeOutcome::Failed { .. } => return failed,
                NodeOutcome::WaitingForHuman => {
                    return NodeOutcome::Failed {
                        error: "foreach body cannot contain a human node".into(),
                        category: ErrorCategory::Internal,
                    }
                }
            }
        }
        NodeOutcome::Done { output: Value::Array(results), variables: HashMap::new() }
    }

    /// Reduced dispatch for a foreach body node: task/condition/switch/
    /// assign/script only (no nested loop/foreach/human, see DESIGN.md).
    async fn execute_body_node(&self, node: &Node, ctx: &EvalContext<'_>, cwd: &str, cancel: CancellationToken) -> NodeOutcome {
        match &node.payload {
            NodePayload::Task { prompt, persona, timeout_ms } => {
                self.execute_task(prompt, persona.as_deref(), *timeout_ms, ctx, cwd, 0, cancel).await
            }
            NodePayload::Condition { expression } => {
                NodeOutcome::Done { output: Value::Bool(evaluate_bool(expression, ctx)), variables: HashMap::new() }
            }
            NodePayload::Switch { expression } | NodePayload::Script { expression } => match evaluate(expression, ctx) {
                Ok(value) => NodeOutcome::Done { output: value, variables: HashMap::new() },
                Err(e) => NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Validation },
            },
            NodePayload::Assign { assignments } => {
                let mut variables = HashMap::new();
                for (path, expression) in assignments {
                    match evaluate(expression, ctx) {
                        Ok(value) => {
                            variables.insert(path.clone(), value);
                        }
                        Err(e) => return NodeOutcome::Failed { error: e.to_string(), category: ErrorCategory::Validation },
                    }
                }
                NodeOutcome::Done { output: Value::Null, variables }
            }
            _ => NodeOutcome::Failed { error: "unsupported foreach body node type".into(), category: ErrorCategory::Internal },
        }
    }
}

/// Substitute `{{ expr }}` tokens in a task prompt with the evaluated
/// expression's string form, then prefix the persona if present (spec
/// §4.9 "Build a prompt from node.task.prompt + persona + instance
/// variables").
fn render_prompt(prompt: &str, persona: Option<&str>, ctx: &EvalContext<'_>) -> String {
    let mut rendered = String::with_capacity(prompt.len());
    let mut rest = prompt;
    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let expr = after[..end].trim();
                let value = evaluate(expr, ctx).map(|v| to_str(&v)).unwrap_or_default();
                rendered.push_str(&value);
                rest = &after[end + 2..];
            }
            None => {
                rendered.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    rendered.push_str(rest);
    match persona {
        Some(persona) if !persona.is_empty() => format!("[persona: {persona}]\n{rendered}"),
        _ => rendered,
    }
}

/// Body nodes of a loop: everything reachable from `body_entry` without
/// revisiting the loop node itself (spec §4.9 "Re-entering the loop body
/// calls resetNodeState on the body nodes").
fn loop_body_nodes(workflow: &Workflow, loop_node: oj_core::NodeId, body_entry: oj_core::NodeId) -> Vec<oj_core::NodeId> {
    use std::collections::{HashSet, VecDeque};
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([body_entry]);
    while let Some(current) = queue.pop_front() {
        if current == loop_node || !visited.insert(current) {
            continue;
        }
        for edge in workflow.outgoing_edges(&current) {
            queue.push_back(edge.to);
        }
    }
    visited.into_iter().collect()
}

/// Sleep helper retained for symmetry with the teacher's
/// `run_with_timeout`; the backend trait itself is responsible for
/// enforcing `timeout_ms` (spec §6), this is only used by callers that
/// need a bare delay (e.g. the worker's idle wait, §4.8).
pub async fn idle_wait(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
