//! Top-level orchestrator (spec §4.6-§4.13 tied together): owns the worker
//! pool, the task lifecycle API, and the human-approval resolution path
//! (spec §6), and bridges workflow-level events onto task status.
//!
//! Grounded on the teacher's `crates/daemon/src/listener/workers.rs` (a
//! facade that owns a worker pool plus the handlers that drive it) and
//! `crates/engine/src/runtime/handlers/lifecycle.rs` (the event-to-status
//! bridge, generalized here from a single job to the task+instance pair).

use std::sync::Arc;

use async_trait::async_trait;
use oj_adapters::{ApprovalDecision, ApprovalFront, Backend, WorkflowSynthesizer};
use oj_core::{EventName, EventPayload, JobId, JobStatus, NodeStatus, TaskStatus};
use oj_storage::{Queue, TaskStore, WorkflowStore};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::event_bus::{EventBus, EventHandler};
use crate::executor::NodeExecutor;
use crate::lifecycle::Lifecycle;
use crate::reconcile;
use crate::state_manager::StateManager;
use crate::worker::{InstanceTokens, Worker, WorkerConfig};

/// Ties every engine piece to one daemon process: storage handles, the
/// event bus, the worker pool, and the task lifecycle API.
pub struct Engine<B: Backend + ?Sized> {
    task_store: Arc<TaskStore>,
    workflow_store: Arc<WorkflowStore>,
    queue: Arc<Queue>,
    event_bus: Arc<EventBus>,
    approval_front: Arc<dyn ApprovalFront>,
    worker: Arc<Worker<B>>,
    tokens: Arc<InstanceTokens>,
    lifecycle: Lifecycle,
}

impl<B: Backend + ?Sized> Engine<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_store: Arc<TaskStore>,
        workflow_store: Arc<WorkflowStore>,
        queue: Arc<Queue>,
        backend: Arc<B>,
        synthesizer: Arc<dyn WorkflowSynthesizer>,
        approval_front: Arc<dyn ApprovalFront>,
        worker_config: WorkerConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let tokens = Arc::new(InstanceTokens::new());
        let executor = Arc::new(NodeExecutor::new(backend, workflow_store.clone()));
        let worker = Arc::new(Worker::new(
            queue.clone(),
            workflow_store.clone(),
            task_store.clone(),
            executor,
            event_bus.clone(),
            tokens.clone(),
            worker_config,
        ));
        let lifecycle = Lifecycle::new(
            task_store.clone(),
            workflow_store.clone(),
            queue.clone(),
            synthesizer,
            event_bus.clone(),
        );

        let bridge: Arc<dyn EventHandler> =
            Arc::new(WorkflowToTaskBridge { task_store: task_store.clone(), workflow_store: workflow_store.clone(), event_bus: event_bus.clone() });
        event_bus.subscribe(EventName::WorkflowCompleted, bridge.clone());
        event_bus.subscribe(EventName::WorkflowFailed, bridge);

        Self { task_store, workflow_store, queue, event_bus, approval_front, worker, tokens, lifecycle }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Drive the worker pool's poll loop until `shutdown` fires (spec §4.8).
    pub async fn run(&self, clock: &impl oj_core::Clock, shutdown: CancellationToken) {
        self.worker.run(clock, shutdown).await
    }

    /// Cancel the suspension points reachable by a paused/stopped instance
    /// (spec §5 "Suspension points"), called by the lifecycle caller
    /// alongside `pause`/`stop` when it already knows the instance id.
    pub fn cancel_instance(&self, instance_id: oj_core::InstanceId) {
        self.tokens.cancel(instance_id);
    }

    /// Resolve one human-approval job (spec §6, §4.9 human row): on
    /// approval the node is marked done and the graph is advanced from it;
    /// on rejection the node is marked failed with the given reason, which
    /// may or may not end the whole instance depending on whether it was on
    /// every remaining path to `end` (spec §4.11).
    pub async fn resume_human(&self, job_id: &JobId, decision: ApprovalDecision, now_ms: u64) -> Result<()> {
        let job = self.queue.get_job(job_id)?.ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
        if job.status != JobStatus::HumanWaiting {
            return Err(EngineError::PreconditionFailed(format!("job {job_id} is not awaiting human approval")));
        }
        let task_id = job.data.task_id;
        let workflow = self
            .workflow_store
            .get_workflow(&task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("workflow for task {task_id}")))?;

        match decision {
            ApprovalDecision::Approve => {
                self.queue.resume_waiting_job(job_id, now_ms)?;
                let instance = self.workflow_store.update_node_state(&task_id, &job.data.node_id, |state| {
                    state.status = NodeStatus::Done;
                    state.attempts += 1;
                    state.completed_at_ms = Some(now_ms);
                    state.error = None;
                })?;
                self.event_bus
                    .emit(EventPayload::NodeCompleted { instance_id: instance.id, node_id: job.data.node_id })
                    .await;

                let advance = StateManager::advance(&workflow, &instance, &job.data.node_id);
                reconcile::apply_advance(
                    &self.queue,
                    &self.workflow_store,
                    &self.task_store,
                    &task_id,
                    &workflow,
                    &instance,
                    &advance,
                    now_ms,
                )
                .await?;
                reconcile::maybe_finalize(&self.queue, &self.workflow_store, &self.event_bus, &task_id, &workflow, now_ms).await
            }
            ApprovalDecision::Reject { reason } => {
                self.queue.mark_job_failed(job_id, reason.clone(), now_ms)?;
                let instance = self.workflow_store.update_node_state(&task_id, &job.data.node_id, |state| {
                    state.status = NodeStatus::Failed;
                    state.attempts += 1;
                    state.error = Some(reason.clone());
                    state.completed_at_ms = Some(now_ms);
                })?;
                self.event_bus
                    .emit(EventPayload::NodeFailed { instance_id: instance.id, node_id: job.data.node_id, error: reason.clone() })
                    .await;

                let advance = StateManager::advance(&workflow, &instance, &job.data.node_id);
                reconcile::apply_advance(
                    &self.queue,
                    &self.workflow_store,
                    &self.task_store,
                    &task_id,
                    &workflow,
                    &instance,
                    &advance,
                    now_ms,
                )
                .await?;

                if StateManager::blocks_all_paths_to_end(&workflow, &job.data.node_id) {
                    return reconcile::finalize_instance(
                        &self.queue,
                        &self.workflow_store,
                        &self.event_bus,
                        &task_id,
                        instance.id,
                        oj_core::InstanceStatus::Failed,
                        Some(reason),
                        now_ms,
                    )
                    .await;
                }
                reconcile::maybe_finalize(&self.queue, &self.workflow_store, &self.event_bus, &task_id, &workflow, now_ms).await
            }
        }
    }

    /// Poll every job parked awaiting approval and resolve each through the
    /// configured front-end (spec §6 "polls `getWaitingHumanJobs`").
    /// Returns the number of jobs resolved.
    pub async fn poll_approvals(&self, now_ms: u64) -> Result<usize> {
        let waiting = self.queue.get_waiting_human_jobs()?;
        let mut resolved = 0;
        for job in waiting {
            let decision = self.approval_front.decide(&job.id).await;
            self.resume_human(&job.id, decision, now_ms).await?;
            resolved += 1;
        }
        Ok(resolved)
    }
}

/// Bridges `workflow:completed`/`workflow:failed` onto the owning task's
/// status: a workflow only ever completes into `reviewing` (spec §4.13
/// `complete`'s precondition), never straight to `completed` — a human
/// still has to call `complete`/`reject`. A workflow failure, by contrast,
/// has no review step: it fails the task directly and emits `task:failed`,
/// since no lifecycle operation otherwise produces that event.
struct WorkflowToTaskBridge {
    task_store: Arc<TaskStore>,
    workflow_store: Arc<WorkflowStore>,
    event_bus: Arc<EventBus>,
}

#[async_trait]
impl EventHandler for WorkflowToTaskBridge {
    async fn handle(&self, payload: &EventPayload) {
        match payload {
            EventPayload::WorkflowCompleted { instance_id } => {
                let Ok(Some(task_id)) = self.workflow_store.task_id_for_instance(instance_id) else { return };
                if let Err(error) = self.task_store.update(&task_id, |t| t.status = TaskStatus::Reviewing) {
                    tracing::error!(%task_id, %error, "failed to move task to reviewing after workflow completion");
                }
            }
            EventPayload::WorkflowFailed { instance_id, error } => {
                let Ok(Some(task_id)) = self.workflow_store.task_id_for_instance(instance_id) else { return };
                if let Err(store_error) = self.task_store.update(&task_id, |t| t.status = TaskStatus::Failed) {
                    tracing::error!(%task_id, error = %store_error, "failed to move task to failed after workflow failure");
                    return;
                }
                self.event_bus.emit(EventPayload::TaskFailed { task_id, error: error.clone() }).await;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
