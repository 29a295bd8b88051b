use std::sync::Arc;

use oj_core::test_support::{linear_workflow, test_task};
use oj_core::{EventPayload, InstanceStatus, NodeStatus};
use oj_storage::paths::DataRoot;
use oj_storage::{Queue, TaskStore, WorkflowStore};
use parking_lot::Mutex;
use tempfile::TempDir;

use super::*;
use crate::state_manager::StateManager;

fn harness() -> (TempDir, Queue, WorkflowStore, TaskStore, EventBus) {
    let dir = TempDir::new().unwrap();
    let root = DataRoot::new(dir.path());
    let queue = Queue::new(root.clone());
    let workflow_store = WorkflowStore::new(root.clone());
    let task_store = TaskStore::new(root);
    (dir, queue, workflow_store, task_store, EventBus::new())
}

fn seed(task_store: &TaskStore, workflow_store: &WorkflowStore, now_ms: u64) -> (oj_core::Task, oj_core::Workflow) {
    let task = test_task(now_ms);
    task_store.create(&task).unwrap();
    let wf = linear_workflow(task.id, now_ms);
    workflow_store.save_workflow(&wf).unwrap();
    workflow_store.create_instance(&task.id, &wf).unwrap();
    (task, wf)
}

#[tokio::test]
async fn apply_advance_persists_ready_nodes_and_enqueues_them() {
    let (_dir, queue, workflow_store, task_store, _bus) = harness();
    let (task, wf) = seed(&task_store, &workflow_store, 1_000);
    let a = &wf.nodes[1];
    let b = &wf.nodes[2];

    workflow_store.update_node_state(&task.id, &a.id, |s| {
        s.status = NodeStatus::Done;
        s.completed_at_ms = Some(1_100);
    }).unwrap();
    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();
    let advance = StateManager::advance(&wf, &instance, &a.id);
    assert_eq!(advance.newly_ready, vec![b.id]);

    apply_advance(&queue, &workflow_store, &task_store, &task.id, &wf, &instance, &advance, 1_100).await.unwrap();

    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();
    assert_eq!(instance.node_states.get(&b.id).unwrap().status, NodeStatus::Ready);
    let job = queue.get_next_job(None, 1_100).unwrap().unwrap();
    assert_eq!(job.data.node_id, b.id);
}

#[tokio::test]
async fn apply_advance_marks_unreachable_nodes_skipped() {
    let (_dir, queue, workflow_store, task_store, _bus) = harness();
    let (task, wf) = seed(&task_store, &workflow_store, 1_000);
    let a = &wf.nodes[1];
    let b = &wf.nodes[2];

    workflow_store.update_node_state(&task.id, &a.id, |s| {
        s.status = NodeStatus::Failed;
        s.completed_at_ms = Some(1_100);
    }).unwrap();
    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();
    let advance = StateManager::advance(&wf, &instance, &a.id);
    assert_eq!(advance.newly_skipped, vec![b.id]);
    assert!(advance.newly_ready.is_empty());

    apply_advance(&queue, &workflow_store, &task_store, &task.id, &wf, &instance, &advance, 1_100).await.unwrap();

    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();
    assert_eq!(instance.node_states.get(&b.id).unwrap().status, NodeStatus::Skipped);
    assert_eq!(queue.get_queue_stats(1_100).unwrap().waiting, 0);
}

#[tokio::test]
async fn maybe_finalize_is_a_no_op_while_nodes_remain_unsettled() {
    let (_dir, queue, workflow_store, task_store, bus) = harness();
    let (task, wf) = seed(&task_store, &workflow_store, 1_000);

    maybe_finalize(&queue, &workflow_store, &bus, &task.id, &wf, 1_100).await.unwrap();

    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Pending);
}

#[tokio::test]
async fn maybe_finalize_completes_the_instance_once_every_node_is_terminal() {
    let (_dir, queue, workflow_store, task_store, bus) = harness();
    let (task, wf) = seed(&task_store, &workflow_store, 1_000);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(oj_core::EventName::WorkflowCompleted, Arc::new(move |payload: &EventPayload| {
        sink.lock().push(payload.clone());
    }));

    for node in &wf.nodes {
        workflow_store.update_node_state(&task.id, &node.id, |s| {
            s.status = NodeStatus::Done;
            s.completed_at_ms = Some(1_100);
        }).unwrap();
    }

    maybe_finalize(&queue, &workflow_store, &bus, &task.id, &wf, 1_200).await.unwrap();

    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);
    assert_eq!(seen.lock().len(), 1);
    assert!(matches!(seen.lock()[0], EventPayload::WorkflowCompleted { .. }));
}

#[tokio::test]
async fn finalize_instance_removes_queued_jobs_and_emits_workflow_failed() {
    let (_dir, queue, workflow_store, task_store, bus) = harness();
    let (task, wf) = seed(&task_store, &workflow_store, 1_000);
    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();

    let data = oj_core::JobData {
        instance_id: instance.id,
        node_id: wf.nodes[1].id,
        workflow_id: wf.id,
        task_id: task.id,
        attempt: 0,
        persona: None,
        prompt_ref: None,
    };
    queue.enqueue_node(data, 0, 0, 1_000).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(oj_core::EventName::WorkflowFailed, Arc::new(move |payload: &EventPayload| {
        sink.lock().push(payload.clone());
    }));

    finalize_instance(
        &queue,
        &workflow_store,
        &bus,
        &task.id,
        instance.id,
        InstanceStatus::Failed,
        Some("node a blew up".into()),
        1_200,
    )
    .await
    .unwrap();

    assert_eq!(queue.get_queue_stats(1_200).unwrap().waiting, 0);
    let instance = workflow_store.get_instance(&task.id).unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Failed);
    assert_eq!(instance.error.as_deref(), Some("node a blew up"));
    assert_eq!(seen.lock().len(), 1);
    assert!(matches!(&seen.lock()[0], EventPayload::WorkflowFailed { error, .. } if error == "node a blew up"));
}
