//! Task lifecycle API (spec §4.13): create/start/pause/resume/stop/
//! complete/reject/inject, each idempotent against its own terminal
//! precondition.
//!
//! Grounded on the teacher's `crates/daemon/src/engine/runtime/handlers/lifecycle.rs`
//! and `crates/daemon/src/engine/runtime/handlers/worker/lifecycle.rs`
//! (pause/resume/stop handlers over a job's status machine), generalized
//! from the teacher's single job status to this system's task+instance
//! pair.

use std::sync::Arc;

use oj_adapters::WorkflowSynthesizer;
use oj_core::{
    EventPayload, InstanceStatus, Node, NodePayload, NodeStatus, PauseInfo, Priority, ProcessInfo, Task, TaskId,
    TaskStatus,
};
use oj_storage::{Queue, TaskStore, WorkflowStore};

use crate::error::{EngineError, Result};
use crate::event_bus::EventBus;
use crate::reconcile;
use crate::state_manager::StateManager;

pub struct Lifecycle {
    task_store: Arc<TaskStore>,
    workflow_store: Arc<WorkflowStore>,
    queue: Arc<Queue>,
    synthesizer: Arc<dyn WorkflowSynthesizer>,
    event_bus: Arc<EventBus>,
}

impl Lifecycle {
    pub fn new(
        task_store: Arc<TaskStore>,
        workflow_store: Arc<WorkflowStore>,
        queue: Arc<Queue>,
        synthesizer: Arc<dyn WorkflowSynthesizer>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self { task_store, workflow_store, queue, synthesizer, event_bus }
    }

    /// Create a task, synthesize its workflow, and persist a pending
    /// instance (spec §4.13 "create").
    pub async fn create(&self, title: &str, description: &str, working_dir: &str, now_ms: u64) -> Result<Task> {
        let task = Task::new(title, description, working_dir, now_ms);
        self.task_store.create(&task)?;
        let workflow = self.synthesizer.synthesize(task.id, description, now_ms).await;
        self.workflow_store.save_workflow(&workflow)?;
        self.workflow_store.create_instance(&task.id, &workflow)?;
        self.event_bus.emit(EventPayload::TaskCreated { task_id: task.id }).await;
        Ok(task)
    }

    /// `pending -> planning -> developing`; enqueue the workflow's initial
    /// nodes (spec §4.13 "start").
    pub async fn start(&self, task_id: &TaskId, pid: u32, now_ms: u64) -> Result<Task> {
        let task = self.require_task(task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(EngineError::PreconditionFailed(format!("task {task_id} is not pending")));
        }
        let workflow = self.require_workflow(task_id)?;
        let instance = self.require_instance(task_id)?;

        self.task_store.set_process(task_id, &ProcessInfo::running(pid, now_ms))?;
        let task = self.task_store.update(task_id, |t| t.status = TaskStatus::Developing)?;
        self.workflow_store.update_instance_status(task_id, InstanceStatus::Running, None, now_ms)?;

        let priority = task.priority.weight();
        for node_id in StateManager::initial_nodes(&workflow) {
            self.workflow_store.update_node_state(task_id, &node_id, |state| state.status = NodeStatus::Ready)?;
            let node = workflow.node(&node_id).ok_or_else(|| EngineError::Internal(format!("unknown node {node_id}")))?;
            reconcile::enqueue_ready_node(&self.queue, task_id, workflow.id, instance.id, node, priority, now_ms)?;
        }
        self.event_bus.emit(EventPayload::WorkflowStarted { instance_id: instance.id }).await;
        self.event_bus.emit(EventPayload::TaskStarted { task_id: *task_id }).await;
        Ok(task)
    }

    /// Set the paused flag; in-flight work drains on its own, nothing here
    /// forces it (spec §4.13 "pause": precondition `status=developing`).
    pub async fn pause(&self, task_id: &TaskId, reason: Option<String>, now_ms: u64) -> Result<Task> {
        let task = self.require_task(task_id)?;
        if !task.status.can_pause() {
            return Err(EngineError::PreconditionFailed(format!("task {task_id} is not developing")));
        }
        let task = self.task_store.update(task_id, |t| t.status = TaskStatus::Paused)?;
        let mut instance = self.require_instance(task_id)?;
        instance.pause = Some(PauseInfo { paused_at_ms: now_ms, reason: reason.clone() });
        self.workflow_store.update_instance_status(task_id, InstanceStatus::Paused, None, now_ms)?;
        self.event_bus.emit(EventPayload::TaskPaused { task_id: *task_id, reason }).await;
        Ok(task)
    }

    /// Clear the paused flag and resume any jobs parked while paused
    /// (spec §4.13 "resume": precondition `status=paused` and the owner
    /// pid still alive, else refuse and recommend a respawn).
    pub async fn resume(&self, task_id: &TaskId, now_ms: u64) -> Result<Task> {
        let task = self.require_task(task_id)?;
        if !task.status.can_resume() {
            return Err(EngineError::PreconditionFailed(format!("task {task_id} is not paused")));
        }
        let process = self
            .task_store
            .get_process(task_id)?
            .ok_or_else(|| EngineError::PreconditionFailed(format!("task {task_id} has no owner process")))?;
        if !TaskStore::is_process_running(process.pid) {
            return Err(EngineError::PreconditionFailed(format!(
                "task {task_id}'s owner process is dead; respawn instead of resuming"
            )));
        }

        let task = self.task_store.update(task_id, |t| t.status = TaskStatus::Developing)?;
        let instance = self.require_instance(task_id)?;
        self.workflow_store.update_instance_status(task_id, InstanceStatus::Running, None, now_ms)?;
        self.queue.resume_waiting_jobs_for_instance(instance.id, now_ms)?;
        self.event_bus.emit(EventPayload::TaskResumed { task_id: *task_id }).await;
        Ok(task)
    }

    /// Kill the owner process and cancel outstanding work
    /// (spec §4.13 "stop": precondition "not terminal").
    pub async fn stop(&self, task_id: &TaskId, now_ms: u64) -> Result<Task> {
        let task = self.require_task(task_id)?;
        if task.status.is_terminal() {
            return Ok(task); // idempotent against its terminal precondition
        }
        if let Some(process) = self.task_store.get_process(task_id)? {
            TaskStore::stop_process(process.pid);
        }
        let instance = self.require_instance(task_id)?;
        self.queue.remove_workflow_jobs(instance.id, now_ms)?;
        self.workflow_store.update_instance_status(task_id, InstanceStatus::Cancelled, None, now_ms)?;
        self.task_store.clear_process(task_id)?;
        let task = self.task_store.update(task_id, |t| t.status = TaskStatus::Cancelled)?;
        self.event_bus.emit(EventPayload::TaskStopped { task_id: *task_id, reason: None }).await;
        Ok(task)
    }

    /// `reviewing -> completed` (spec §4.13 "complete").
    pub async fn complete(&self, task_id: &TaskId) -> Result<Task> {
        let task = self.require_task(task_id)?;
        if !task.status.can_review() {
            return Err(EngineError::PreconditionFailed(format!("task {task_id} is not reviewing")));
        }
        let task = self.task_store.update(task_id, |t| t.status = TaskStatus::Completed)?;
        self.event_bus.emit(EventPayload::TaskCompleted { task_id: *task_id }).await;
        Ok(task)
    }

    /// `reviewing -> pending`, bumping `retry_count` (spec §4.13 "reject").
    pub fn reject(&self, task_id: &TaskId, reason: impl Into<String>) -> Result<Task> {
        let task = self.require_task(task_id)?;
        if !task.status.can_review() {
            return Err(EngineError::PreconditionFailed(format!("task {task_id} is not reviewing")));
        }
        let reason = reason.into();
        self.task_store.update(task_id, |t| {
            t.status = TaskStatus::Pending;
            t.retry_count += 1;
            t.reject_reason = Some(reason);
        })
    }

    /// Splice an injected task node after the current anchor: the running
    /// node if one exists, else the most recently completed node
    /// (spec §4.13 "inject").
    pub async fn inject(&self, task_id: &TaskId, prompt: &str, persona: Option<String>, now_ms: u64) -> Result<()> {
        let task = self.require_task(task_id)?;
        if task.status.is_terminal() {
            return Err(EngineError::PreconditionFailed(format!("task {task_id} is terminal")));
        }
        let mut workflow = self.require_workflow(task_id)?;
        let instance = self.require_instance(task_id)?;

        let anchor_id = instance
            .node_states
            .iter()
            .find(|(_, state)| state.status == NodeStatus::Running)
            .map(|(id, _)| *id)
            .or_else(|| {
                instance
                    .node_states
                    .iter()
                    .filter(|(_, state)| state.status == NodeStatus::Done)
                    .max_by_key(|(_, state)| state.completed_at_ms.unwrap_or(0))
                    .map(|(id, _)| *id)
            })
            .ok_or_else(|| EngineError::PreconditionFailed(format!("task {task_id} has no running or completed node to anchor on")))?;

        let injected = Node::new("injected", NodePayload::Task { prompt: prompt.to_string(), persona, timeout_ms: None });
        let injected_id = injected.id;

        let original_successors: Vec<oj_core::Edge> = workflow.outgoing_edges(&anchor_id).cloned().collect();
        workflow.edges.retain(|edge| edge.from != anchor_id);
        workflow.edges.push(oj_core::Edge::new(anchor_id, injected_id));
        for successor in &original_successors {
            let mut rewired = oj_core::Edge::new(injected_id, successor.to);
            rewired.condition = successor.condition.clone();
            workflow.edges.push(rewired);
        }
        workflow.nodes.push(injected);
        workflow.updated_at_ms = now_ms;
        self.workflow_store.save_workflow(&workflow)?;
        self.workflow_store.update_node_state(task_id, &injected_id, |state| state.status = NodeStatus::Pending)?;

        // The anchor may already be done, in which case nothing else will
        // ever call `StateManager::advance` for it — compute readiness for
        // the injected node right away rather than waiting on an event
        // that has already happened.
        let instance = self.require_instance(task_id)?;
        let advance = StateManager::advance(&workflow, &instance, &anchor_id);
        if advance.newly_ready.contains(&injected_id) {
            self.workflow_store.update_node_state(task_id, &injected_id, |state| state.status = NodeStatus::Ready)?;
            let priority = self.task_store.get(task_id)?.map(|t| t.priority.weight()).unwrap_or_else(|| Priority::default().weight());
            reconcile::enqueue_ready_node(&self.queue, task_id, workflow.id, instance.id, &injected, priority, now_ms)?;
        }
        Ok(())
    }

    fn require_task(&self, task_id: &TaskId) -> Result<Task> {
        self.task_store.get(task_id)?.ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))
    }

    fn require_workflow(&self, task_id: &TaskId) -> Result<oj_core::Workflow> {
        self.workflow_store.get_workflow(task_id)?.ok_or_else(|| EngineError::NotFound(format!("workflow for task {task_id}")))
    }

    fn require_instance(&self, task_id: &TaskId) -> Result<oj_core::Instance> {
        self.workflow_store.get_instance(task_id)?.ok_or_else(|| EngineError::NotFound(format!("instance for task {task_id}")))
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
