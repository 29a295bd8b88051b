use oj_core::test_support::{linear_workflow, test_task};
use oj_core::NodeStatus;
use tempfile::TempDir;

use super::*;

fn store() -> (TempDir, WorkflowStore) {
    let dir = TempDir::new().unwrap();
    (dir, WorkflowStore::new(DataRoot::new(dir.path())))
}

#[test]
fn save_then_get_workflow_round_trips() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    let wf = linear_workflow(task.id, 1_000);
    store.save_workflow(&wf).unwrap();
    assert_eq!(store.get_workflow(&task.id).unwrap().unwrap(), wf);
}

#[test]
fn create_instance_starts_all_nodes_pending() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    let wf = linear_workflow(task.id, 1_000);
    let instance = store.create_instance(&task.id, &wf).unwrap();
    assert_eq!(instance.status, InstanceStatus::Pending);
    assert!(instance.node_states.values().all(|s| s.status == NodeStatus::Pending && s.attempts == 0));
    assert_eq!(instance.variables, wf.variables);
}

#[test]
fn task_id_for_instance_rebuilds_by_scan() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    let wf = linear_workflow(task.id, 1_000);
    let instance = store.create_instance(&task.id, &wf).unwrap();

    let fresh = WorkflowStore::new(DataRoot::new(store.root.root()));
    assert_eq!(fresh.task_id_for_instance(&instance.id).unwrap(), Some(task.id));
}

#[test]
fn update_instance_status_stamps_started_and_completed() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    let wf = linear_workflow(task.id, 1_000);
    store.create_instance(&task.id, &wf).unwrap();

    let running = store.update_instance_status(&task.id, InstanceStatus::Running, None, 2_000).unwrap();
    assert_eq!(running.started_at_ms, Some(2_000));

    let done = store.update_instance_status(&task.id, InstanceStatus::Completed, None, 3_000).unwrap();
    assert_eq!(done.completed_at_ms, Some(3_000));
}

#[test]
fn reset_node_state_clears_attempts() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    let wf = linear_workflow(task.id, 1_000);
    let instance = store.create_instance(&task.id, &wf).unwrap();
    let node_id = wf.nodes[1].id;

    store.update_node_state(&task.id, &node_id, |s| s.attempts = 2).unwrap();
    let reset = store.reset_node_state(&task.id, &node_id).unwrap();
    assert_eq!(reset.node_states[&node_id].attempts, 0);
    assert!(instance.node_states.contains_key(&node_id));
}

#[test]
fn increment_loop_count_is_monotonic() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    let wf = linear_workflow(task.id, 1_000);
    store.create_instance(&task.id, &wf).unwrap();
    let edge_id = wf.edges[0].id;

    assert_eq!(store.increment_loop_count(&task.id, &edge_id).unwrap(), 1);
    assert_eq!(store.increment_loop_count(&task.id, &edge_id).unwrap(), 2);
}

#[test]
fn update_instance_variables_supports_dotted_paths() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    let wf = linear_workflow(task.id, 1_000);
    store.create_instance(&task.id, &wf).unwrap();

    let mut patch = std::collections::HashMap::new();
    patch.insert("review.approved".to_string(), serde_json::json!(true));
    let instance = store.update_instance_variables(&task.id, &patch).unwrap();
    assert_eq!(instance.get_variable_path("review.approved"), Some(&serde_json::json!(true)));
}
