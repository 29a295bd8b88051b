//! Shared graph-reconciliation helpers (spec §4.9 step 5, §4.11): applying
//! a [`StateManager::advance`] result and checking for instance completion.
//! Used by both [`crate::lifecycle::Lifecycle::inject`] and
//! [`crate::engine::Engine::resume_human`], the two call sites that settle
//! a node outside the worker's own dispatch loop.

use oj_core::{EventPayload, Instance, InstanceId, InstanceStatus, NodeStatus, Priority, TaskId, Workflow};
use oj_storage::{Queue, TaskStore, WorkflowStore};

use crate::error::{EngineError, Result};
use crate::event_bus::EventBus;
use crate::state_manager::{Advance, StateManager};

/// Persist newly-skipped nodes, persist and enqueue newly-ready ones.
pub async fn apply_advance(
    queue: &Queue,
    workflow_store: &WorkflowStore,
    task_store: &TaskStore,
    task_id: &TaskId,
    workflow: &Workflow,
    instance: &Instance,
    advance: &Advance,
    now_ms: u64,
) -> Result<()> {
    for node_id in &advance.newly_skipped {
        workflow_store.update_node_state(task_id, node_id, |state| {
            state.status = NodeStatus::Skipped;
            state.completed_at_ms = Some(now_ms);
        })?;
    }
    if advance.newly_ready.is_empty() {
        return Ok(());
    }
    let priority =
        task_store.get(task_id)?.map(|task| task.priority.weight()).unwrap_or_else(|| Priority::default().weight());
    for node_id in &advance.newly_ready {
        workflow_store.update_node_state(task_id, node_id, |state| state.status = NodeStatus::Ready)?;
        let node = workflow
            .node(node_id)
            .ok_or_else(|| EngineError::Internal(format!("advance returned unknown node {node_id}")))?;
        enqueue_ready_node(queue, task_id, workflow.id, instance.id, node, priority, now_ms)?;
    }
    Ok(())
}

/// Enqueue one ready node, applying its retry-policy override on top of the
/// queue's default budget (spec §4.9 "Retry policy").
pub fn enqueue_ready_node(
    queue: &Queue,
    task_id: &TaskId,
    workflow_id: oj_core::WorkflowId,
    instance_id: InstanceId,
    node: &oj_core::Node,
    priority: i32,
    now_ms: u64,
) -> Result<()> {
    let persona = match &node.payload {
        oj_core::NodePayload::Task { persona, .. } => persona.clone(),
        _ => None,
    };
    let data =
        oj_core::JobData { instance_id, node_id: node.id, workflow_id, task_id: *task_id, attempt: 0, persona, prompt_ref: None };
    let max_attempts = node
        .retry
        .and_then(|retry| retry.max_attempts)
        .map(|configured| configured.max(oj_core::job::DEFAULT_MAX_ATTEMPTS))
        .unwrap_or(oj_core::job::DEFAULT_MAX_ATTEMPTS);
    let id = queue.enqueue_node(data, priority, 0, now_ms)?;
    queue.set_job_max_attempts(&id, max_attempts, now_ms)?;
    Ok(())
}

pub async fn maybe_finalize(
    queue: &Queue,
    workflow_store: &WorkflowStore,
    event_bus: &EventBus,
    task_id: &TaskId,
    workflow: &Workflow,
    now_ms: u64,
) -> Result<()> {
    let instance = workflow_store
        .get_instance(task_id)?
        .ok_or_else(|| EngineError::NotFound(format!("instance for task {task_id}")))?;
    let Some(status) = StateManager::terminal_status(workflow, &instance) else { return Ok(()) };
    finalize_instance(queue, workflow_store, event_bus, task_id, instance.id, status, instance.error.clone(), now_ms).await
}

pub async fn finalize_instance(
    queue: &Queue,
    workflow_store: &WorkflowStore,
    event_bus: &EventBus,
    task_id: &TaskId,
    instance_id: InstanceId,
    status: InstanceStatus,
    error: Option<String>,
    now_ms: u64,
) -> Result<()> {
    workflow_store.update_instance_status(task_id, status, error.clone(), now_ms)?;
    queue.remove_workflow_jobs(instance_id, now_ms)?;
    match status {
        InstanceStatus::Completed => event_bus.emit(EventPayload::WorkflowCompleted { instance_id }).await,
        InstanceStatus::Failed => {
            event_bus.emit(EventPayload::WorkflowFailed { instance_id, error: error.unwrap_or_default() }).await
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
