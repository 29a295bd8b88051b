//! Worker / scheduler (spec §4.8): polls the queue, dispatches ready jobs
//! to the node executor under a bounded global concurrency slot, and
//! reconciles the graph (spec §4.9 steps 5-6, §4.11) once a node settles.
//!
//! Grounded on the teacher's `crates/engine/src/runtime/monitor.rs` (a
//! polling loop driving effects out of a shared runtime) and
//! `crates/daemon/src/listener/workers.rs` (worker start/stop lifecycle),
//! generalized from the teacher's agent-session model to the node-graph
//! dispatch loop described above.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use oj_adapters::Backend;
use oj_core::{
    Clock, EventPayload, Instance, InstanceId, InstanceStatus, Job, JobData, NodeStatus, Priority, TaskId, Workflow,
};
use oj_storage::{Queue, TaskStore, WorkflowStore};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::event_bus::EventBus;
use crate::executor::{NodeExecutor, NodeOutcome};
use crate::state_manager::{Advance, StateManager};

/// Tunables (spec §4.8: "T_poll default 200ms", "T_idle default 500ms",
/// "N-slots default 10 process-wide").
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub idle_wait_ms: u64,
    pub global_slots: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 200, idle_wait_ms: 500, global_slots: 10 }
    }
}

/// Per-instance cancellation, so pause/stop can reach a worker suspended at
/// any of its cancellable suspension points (spec §5 "Suspension points").
#[derive(Default)]
pub struct InstanceTokens {
    tokens: Mutex<HashMap<InstanceId, CancellationToken>>,
}

impl InstanceTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(&self, instance_id: InstanceId) -> CancellationToken {
        self.tokens.lock().entry(instance_id).or_insert_with(CancellationToken::new).clone()
    }

    /// Cancel and drop the current token; the next dispatch for this
    /// instance gets a fresh one (spec §4.13 resume clears the paused flag).
    pub fn cancel(&self, instance_id: InstanceId) {
        if let Some(token) = self.tokens.lock().remove(&instance_id) {
            token.cancel();
        }
    }
}

pub struct Worker<B: Backend + ?Sized> {
    queue: Arc<Queue>,
    workflow_store: Arc<WorkflowStore>,
    task_store: Arc<TaskStore>,
    executor: Arc<NodeExecutor<B>>,
    event_bus: Arc<EventBus>,
    tokens: Arc<InstanceTokens>,
    slots: Arc<Semaphore>,
    config: WorkerConfig,
}

impl<B: Backend + ?Sized> Worker<B> {
    pub fn new(
        queue: Arc<Queue>,
        workflow_store: Arc<WorkflowStore>,
        task_store: Arc<TaskStore>,
        executor: Arc<NodeExecutor<B>>,
        event_bus: Arc<EventBus>,
        tokens: Arc<InstanceTokens>,
        config: WorkerConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.global_slots.max(1)));
        Self { queue, workflow_store, task_store, executor, event_bus, tokens, slots, config }
    }

    /// Drive the poll loop until `shutdown` fires (spec §4.8 "stop when a
    /// shutdown flag is set").
    pub async fn run(&self, clock: &impl Clock, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
            }
            match self.poll_once(clock.epoch_ms()).await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(self.config.idle_wait_ms)) => {}
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "transient dequeue failure, backing off");
                }
            }
        }
    }

    /// One dispatch attempt: fetch the next ready job and run it to
    /// completion (spec §4.8 steps 1-7). Returns `true` if a job was found.
    pub async fn poll_once(&self, now_ms: u64) -> Result<bool> {
        let Some(job) = self.queue.get_next_job(None, now_ms)? else { return Ok(false) };
        self.dispatch(job, now_ms).await?;
        Ok(true)
    }

    async fn dispatch(&self, job: Job, now_ms: u64) -> Result<()> {
        self.event_bus
            .emit(EventPayload::NodeStarted {
                instance_id: job.data.instance_id,
                node_id: job.data.node_id,
                attempt: job.attempt,
            })
            .await;

        let instance_token = self.tokens.token_for(job.data.instance_id);
        let permit = tokio::select! {
            biased;
            _ = instance_token.cancelled() => None,
            acquired = self.slots.clone().acquire_owned() => {
                Some(acquired.map_err(|_| EngineError::Internal("worker slot semaphore closed".into()))?)
            }
        };
        let Some(_permit) = permit else {
            // Pause/stop observed at slot acquisition (spec §4.8 step 3):
            // requeue untouched, no retry bump.
            self.queue.release_active_jobs(&[job.id.clone()], now_ms)?;
            return Ok(());
        };

        let workflow = self
            .workflow_store
            .get_workflow(&job.data.task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("workflow for task {}", job.data.task_id)))?;
        let instance = self
            .workflow_store
            .get_instance(&job.data.task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("instance for task {}", job.data.task_id)))?;
        if instance.status == InstanceStatus::Paused || instance.status.is_terminal() {
            self.queue.release_active_jobs(&[job.id.clone()], now_ms)?;
            return Ok(());
        }
        let node = workflow
            .node(&job.data.node_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("node {}", job.data.node_id)))?;
        let task = self
            .task_store
            .get(&job.data.task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("task {}", job.data.task_id)))?;

        self.workflow_store.update_node_state(&job.data.task_id, &job.data.node_id, |state| {
            state.status = NodeStatus::Running;
            if state.started_at_ms.is_none() {
                state.started_at_ms = Some(now_ms);
            }
        })?;

        let outcome = self
            .executor
            .execute(job.data.task_id, &workflow, &instance, &node, job.attempt, &task.working_dir, now_ms, instance_token)
            .await;

        match outcome {
            NodeOutcome::Done { output, variables } => {
                self.handle_success(&job, &workflow, output, variables, now_ms).await
            }
            NodeOutcome::Failed { error, .. } => self.handle_failure(&job, &workflow, &node, error, now_ms).await,
            NodeOutcome::Cancelled => {
                // Cancellation never consumes the retry budget (spec §5).
                self.queue.release_active_jobs(&[job.id.clone()], now_ms)?;
                self.workflow_store.update_node_state(&job.data.task_id, &job.data.node_id, |state| {
                    state.status = NodeStatus::Ready;
                })?;
                Ok(())
            }
            NodeOutcome::WaitingForHuman => {
                self.queue.mark_job_waiting(&job.id, now_ms)?;
                self.workflow_store.update_node_state(&job.data.task_id, &job.data.node_id, |state| {
                    state.status = NodeStatus::Waiting;
                })?;
                Ok(())
            }
        }
    }

    async fn handle_success(
        &self,
        job: &Job,
        workflow: &Workflow,
        output: serde_json::Value,
        variables: HashMap<String, serde_json::Value>,
        now_ms: u64,
    ) -> Result<()> {
        if !variables.is_empty() {
            self.workflow_store.update_instance_variables(&job.data.task_id, &variables)?;
        }
        self.workflow_store.set_node_output(&job.data.task_id, &job.data.node_id, output)?;
        let instance = self.workflow_store.update_node_state(&job.data.task_id, &job.data.node_id, |state| {
            state.status = NodeStatus::Done;
            state.attempts += 1;
            state.completed_at_ms = Some(now_ms);
            state.error = None;
        })?;
        self.queue.complete_job(&job.id, now_ms)?;
        self.event_bus
            .emit(EventPayload::NodeCompleted { instance_id: instance.id, node_id: job.data.node_id })
            .await;

        let advance = StateManager::advance(workflow, &instance, &job.data.node_id);
        self.apply_advance(&job.data.task_id, workflow, &instance, &advance, now_ms).await?;
        self.event_bus.emit(StateManager::progress_event(workflow, &instance)).await;
        self.maybe_finalize(&job.data.task_id, workflow, now_ms).await
    }

    async fn handle_failure(
        &self,
        job: &Job,
        workflow: &Workflow,
        node: &oj_core::Node,
        message: String,
        now_ms: u64,
    ) -> Result<()> {
        let is_final_attempt = job.attempt + 1 >= job.max_attempts;
        self.queue.fail_job(&job.id, message.clone(), now_ms)?;

        if !is_final_attempt {
            self.workflow_store.update_node_state(&job.data.task_id, &job.data.node_id, |state| {
                state.status = NodeStatus::Ready;
                state.attempts += 1;
                state.error = Some(message);
            })?;
            return Ok(());
        }

        let instance = self.workflow_store.update_node_state(&job.data.task_id, &job.data.node_id, |state| {
            state.status = NodeStatus::Failed;
            state.attempts += 1;
            state.error = Some(message.clone());
            state.completed_at_ms = Some(now_ms);
        })?;
        self.event_bus
            .emit(EventPayload::NodeFailed { instance_id: instance.id, node_id: job.data.node_id, error: message.clone() })
            .await;

        let advance = StateManager::advance(workflow, &instance, &job.data.node_id);
        self.apply_advance(&job.data.task_id, workflow, &instance, &advance, now_ms).await?;

        if StateManager::blocks_all_paths_to_end(workflow, &node.id) {
            return self
                .finalize_instance(&job.data.task_id, instance.id, InstanceStatus::Failed, Some(message), now_ms)
                .await;
        }
        self.maybe_finalize(&job.data.task_id, workflow, now_ms).await
    }

    /// Apply one reconciliation pass: persist newly-skipped nodes, persist
    /// and enqueue newly-ready ones (spec §4.9 step 5, §4.11).
    async fn apply_advance(
        &self,
        task_id: &TaskId,
        workflow: &Workflow,
        instance: &Instance,
        advance: &Advance,
        now_ms: u64,
    ) -> Result<()> {
        for node_id in &advance.newly_skipped {
            self.workflow_store.update_node_state(task_id, node_id, |state| {
                state.status = NodeStatus::Skipped;
                state.completed_at_ms = Some(now_ms);
            })?;
        }
        if advance.newly_ready.is_empty() {
            return Ok(());
        }
        let priority =
            self.task_store.get(task_id)?.map(|task| task.priority.weight()).unwrap_or_else(|| Priority::default().weight());
        for node_id in &advance.newly_ready {
            self.workflow_store.update_node_state(task_id, node_id, |state| state.status = NodeStatus::Ready)?;
            let node = workflow
                .node(node_id)
                .ok_or_else(|| EngineError::Internal(format!("advance returned unknown node {node_id}")))?;
            self.enqueue_node(task_id, workflow.id, instance.id, node, priority, now_ms)?;
        }
        Ok(())
    }

    /// Enqueue one ready node, applying its retry-policy override on top of
    /// the queue's default budget (spec §4.9 "Retry policy").
    fn enqueue_node(
        &self,
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
        let data = JobData { instance_id, node_id: node.id, workflow_id, task_id: *task_id, attempt: 0, persona, prompt_ref: None };
        let max_attempts = node
            .retry
            .and_then(|retry| retry.max_attempts)
            .map(|configured| configured.max(oj_core::job::DEFAULT_MAX_ATTEMPTS))
            .unwrap_or(oj_core::job::DEFAULT_MAX_ATTEMPTS);
        let id = self.queue.enqueue_node(data, priority, 0, now_ms)?;
        self.queue.set_job_max_attempts(&id, max_attempts, now_ms)?;
        Ok(())
    }

    async fn maybe_finalize(&self, task_id: &TaskId, workflow: &Workflow, now_ms: u64) -> Result<()> {
        let instance = self
            .workflow_store
            .get_instance(task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("instance for task {task_id}")))?;
        let Some(status) = StateManager::terminal_status(workflow, &instance) else { return Ok(()) };
        self.finalize_instance(task_id, instance.id, status, instance.error.clone(), now_ms).await
    }

    async fn finalize_instance(
        &self,
        task_id: &TaskId,
        instance_id: InstanceId,
        status: InstanceStatus,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<()> {
        self.workflow_store.update_instance_status(task_id, status, error.clone(), now_ms)?;
        self.queue.remove_workflow_jobs(instance_id, now_ms)?;
        match status {
            InstanceStatus::Completed => self.event_bus.emit(EventPayload::WorkflowCompleted { instance_id }).await,
            InstanceStatus::Failed => {
                self.event_bus.emit(EventPayload::WorkflowFailed { instance_id, error: error.unwrap_or_default() }).await
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
