//! Crash recovery (spec §4.12): on daemon start, or on demand, find tasks
//! whose owning process died mid-run and bring their state back to a safe,
//! resumable shape.
//!
//! Grounded on the teacher's `crates/daemon/src/lifecycle/startup.rs`
//! orphan-detection pass (scan breadcrumbs, classify, clean up stale
//! entries, report) generalized from its job-breadcrumb model to the
//! per-task `process.json` PID-liveness check described above.

use oj_core::{InstanceStatus, NodeStatus, TaskId, TaskStatus};
use oj_storage::{Queue, TaskFilter, TaskStore, WorkflowStore};

use crate::error::Result;

/// One task whose owner process was found dead and was reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub task_id: TaskId,
    pub previous_task_status: TaskStatus,
}

/// Scans every task in a runnable status, reconciling any whose
/// `process.json` names a pid that is no longer alive (spec §4.12 steps 1-2).
/// Idempotent: running it twice with no new crashes reports nothing.
pub fn run(task_store: &TaskStore, workflow_store: &WorkflowStore, queue: &Queue, now_ms: u64) -> Result<Vec<Orphan>> {
    let mut orphans = Vec::new();
    for status in [TaskStatus::Planning, TaskStatus::Developing, TaskStatus::Paused] {
        let filter = TaskFilter { status: Some(status) };
        for task_id in task_store.list_ids(&filter)? {
            if let Some(orphan) = reconcile_if_orphaned(task_store, workflow_store, queue, task_id, status, now_ms)? {
                orphans.push(orphan);
            }
        }
    }
    Ok(orphans)
}

fn reconcile_if_orphaned(
    task_store: &TaskStore,
    workflow_store: &WorkflowStore,
    queue: &Queue,
    task_id: TaskId,
    previous_status: TaskStatus,
    now_ms: u64,
) -> Result<Option<Orphan>> {
    let Some(process) = task_store.get_process(&task_id)? else {
        // No process.json at all (e.g. paused before ever starting a
        // worker) — nothing to recover.
        return Ok(None);
    };
    if TaskStore::is_process_running(process.pid) {
        return Ok(None);
    }

    let Some(instance) = workflow_store.get_instance(&task_id)? else { return Ok(None) };

    for (node_id, state) in instance.node_states.iter() {
        if state.status == NodeStatus::Running {
            workflow_store.update_node_state(&task_id, node_id, |state| {
                state.status = NodeStatus::Pending;
                state.error = None;
            })?;
        }
    }

    let active = queue.active_job_ids_for_instance(instance.id)?;
    if !active.is_empty() {
        queue.release_active_jobs(&active, now_ms)?;
    }

    let next_status = if instance.started_at_ms.is_some() { InstanceStatus::Paused } else { InstanceStatus::Pending };
    workflow_store.update_instance_status(&task_id, next_status, instance.error.clone(), now_ms)?;
    task_store.clear_process(&task_id)?;

    Ok(Some(Orphan { task_id, previous_task_status: previous_status }))
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
