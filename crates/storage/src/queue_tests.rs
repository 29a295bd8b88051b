use oj_core::test_support::test_task;
use oj_core::{InstanceId, NodeId, WorkflowId};
use tempfile::TempDir;

use super::*;

fn store() -> (TempDir, Queue) {
    let dir = TempDir::new().unwrap();
    (dir, Queue::new(DataRoot::new(dir.path())))
}

fn job_data() -> JobData {
    let task = test_task(0);
    JobData {
        instance_id: InstanceId::new(),
        node_id: NodeId::new(),
        workflow_id: WorkflowId::new(),
        task_id: task.id,
        attempt: 0,
        persona: None,
        prompt_ref: None,
    }
}

#[test]
fn enqueue_then_dequeue_round_trips() {
    let (_dir, queue) = store();
    let data = job_data();
    let id = queue.enqueue_node(data, 0, 0, 1_000).unwrap();
    let job = queue.get_next_job(None, 1_000).unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.status, JobStatus::Active);
}

#[test]
fn re_enqueue_of_same_tuple_replaces_not_duplicates() {
    let (_dir, queue) = store();
    let data = job_data();
    let first = queue.enqueue_node(data.clone(), 0, 0, 1_000).unwrap();
    let second = queue.enqueue_node(data, 5, 0, 2_000).unwrap();
    assert_eq!(first, second);

    let stats = queue.get_queue_stats(2_000).unwrap();
    assert_eq!(stats.waiting, 1);
}

#[test]
fn higher_priority_is_dequeued_first() {
    let (_dir, queue) = store();
    let low = job_data();
    let mut high_data = job_data();
    high_data.node_id = NodeId::new();
    queue.enqueue_node(low, 0, 0, 1_000).unwrap();
    queue.enqueue_node(high_data.clone(), 10, 0, 1_000).unwrap();

    let picked = queue.get_next_job(None, 1_000).unwrap().unwrap();
    assert_eq!(picked.priority, 10);
}

#[test]
fn future_process_at_excludes_from_selection() {
    let (_dir, queue) = store();
    let data = job_data();
    queue.enqueue_node(data, 0, 60_000, 1_000).unwrap();
    assert!(queue.get_next_job(None, 1_000).unwrap().is_none());
    assert!(queue.get_next_job(None, 61_000).unwrap().is_some());
}

#[test]
fn fail_job_retries_until_budget_exhausted() {
    let (_dir, queue) = store();
    let data = job_data();
    let id = queue.enqueue_node(data, 0, 0, 1_000).unwrap();
    queue.get_next_job(None, 1_000).unwrap();

    queue.fail_job(&id, "boom", 1_000).unwrap();
    let stats = queue.get_queue_stats(1_000).unwrap();
    assert_eq!(stats.delayed, 1);

    // drive it past the retry budget (DEFAULT_MAX_ATTEMPTS = 3)
    queue.get_next_job(None, 3_000).unwrap();
    queue.fail_job(&id, "boom again", 3_000).unwrap();
    queue.get_next_job(None, 10_000).unwrap();
    queue.fail_job(&id, "final", 10_000).unwrap();

    let stats = queue.get_queue_stats(10_000).unwrap();
    assert_eq!(stats.failed, 1);
}

#[test]
fn mark_waiting_then_resume_completes_job() {
    let (_dir, queue) = store();
    let data = job_data();
    let id = queue.enqueue_node(data, 0, 0, 1_000).unwrap();
    queue.get_next_job(None, 1_000).unwrap();
    queue.mark_job_waiting(&id, 1_000).unwrap();

    let waiting = queue.get_waiting_human_jobs().unwrap();
    assert_eq!(waiting.len(), 1);

    queue.resume_waiting_job(&id, 2_000).unwrap();
    let stats = queue.get_queue_stats(2_000).unwrap();
    assert_eq!(stats.completed, 1);
}

#[test]
fn resume_waiting_jobs_for_instance_is_bulk() {
    let (_dir, queue) = store();
    let mut a = job_data();
    let instance_id = a.instance_id;
    let mut b = job_data();
    b.instance_id = instance_id;
    b.node_id = NodeId::new();

    let id_a = queue.enqueue_node(a, 0, 0, 0).unwrap();
    let id_b = queue.enqueue_node(b, 0, 0, 0).unwrap();
    queue.get_next_job(None, 0).unwrap();
    queue.get_next_job(None, 0).unwrap();
    queue.mark_job_waiting(&id_a, 0).unwrap();
    queue.mark_job_waiting(&id_b, 0).unwrap();

    let resumed = queue.resume_waiting_jobs_for_instance(instance_id, 1_000).unwrap();
    assert_eq!(resumed, 2);
}

#[test]
fn remove_workflow_jobs_only_removes_waiting() {
    let (_dir, queue) = store();
    let data = job_data();
    let instance_id = data.instance_id;
    queue.enqueue_node(data, 0, 0, 0).unwrap();

    let removed = queue.remove_workflow_jobs(instance_id, 1_000).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(queue.get_queue_stats(1_000).unwrap().waiting, 0);
}

#[test]
fn cleanup_old_jobs_keeps_most_recent_terminal() {
    let (_dir, queue) = store();
    for i in 0..5u64 {
        let mut data = job_data();
        data.node_id = NodeId::new();
        let id = queue.enqueue_node(data, 0, 0, i * 1_000).unwrap();
        queue.get_next_job(None, i * 1_000).unwrap();
        queue.complete_job(&id, i * 1_000).unwrap();
    }

    let removed = queue.cleanup_old_jobs(2, 10_000).unwrap();
    assert_eq!(removed, 3);
    assert_eq!(queue.get_queue_stats(10_000).unwrap().completed, 2);
}

#[test]
fn release_active_jobs_flips_back_to_waiting() {
    let (_dir, queue) = store();
    let data = job_data();
    let id = queue.enqueue_node(data, 0, 0, 0).unwrap();
    queue.get_next_job(None, 0).unwrap();
    assert_eq!(queue.active_job_ids().unwrap(), vec![id.clone()]);

    queue.release_active_jobs(&[id], 1_000).unwrap();
    assert_eq!(queue.get_queue_stats(1_000).unwrap().waiting, 1);
}

#[test]
fn active_job_ids_for_instance_excludes_other_instances() {
    let (_dir, queue) = store();
    let mine = job_data();
    let instance_id = mine.instance_id;
    let mut other = job_data();
    other.instance_id = InstanceId::new();
    other.node_id = NodeId::new();

    let mine_id = queue.enqueue_node(mine, 0, 0, 0).unwrap();
    queue.enqueue_node(other, 0, 0, 0).unwrap();
    queue.get_next_job(None, 0).unwrap();
    queue.get_next_job(None, 0).unwrap();

    assert_eq!(queue.active_job_ids_for_instance(instance_id).unwrap(), vec![mine_id]);
}

#[test]
fn set_job_max_attempts_overrides_the_default_retry_budget() {
    let (_dir, queue) = store();
    let data = job_data();
    let id = queue.enqueue_node(data, 0, 0, 0).unwrap();
    queue.set_job_max_attempts(&id, 1, 0).unwrap();

    queue.get_next_job(None, 0).unwrap();
    queue.fail_job(&id, "boom", 0).unwrap();
    assert_eq!(queue.get_queue_stats(0).unwrap().failed, 1);
}

#[test]
fn instance_queue_stats_only_count_that_instances_jobs() {
    let (_dir, queue) = store();
    let mine = job_data();
    let instance_id = mine.instance_id;
    let other = job_data();

    queue.enqueue_node(mine, 0, 0, 0).unwrap();
    queue.enqueue_node(other, 0, 0, 0).unwrap();

    let all = queue.get_queue_stats(0).unwrap();
    assert_eq!(all.waiting, 2);

    let mine_only = queue.get_instance_queue_stats(instance_id, 0).unwrap();
    assert_eq!(mine_only.waiting, 1);
}
