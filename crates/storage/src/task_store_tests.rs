use oj_core::test_support::test_task;
use tempfile::TempDir;

use super::*;

fn store() -> (TempDir, TaskStore) {
    let dir = TempDir::new().unwrap();
    let store = TaskStore::new(DataRoot::new(dir.path()));
    (dir, store)
}

#[test]
fn create_then_get_round_trips() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    store.create(&task).unwrap();
    let loaded = store.get(&task.id).unwrap().unwrap();
    assert_eq!(loaded, task);
}

#[test]
fn get_missing_task_is_none() {
    let (_dir, store) = store();
    assert!(store.get(&TaskId::new()).unwrap().is_none());
}

#[test]
fn create_populates_index() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    store.create(&task).unwrap();
    let summaries = store.list(&TaskFilter::default()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].title, task.title);
}

#[test]
fn list_by_status_filters() {
    let (_dir, store) = store();
    let mut pending = test_task(1_000);
    pending.title = "pending one".into();
    let mut developing = test_task(1_000);
    developing.title = "developing one".into();
    developing.status = TaskStatus::Developing;
    store.create(&pending).unwrap();
    store.create(&developing).unwrap();

    let developing_only = store.list_by_status(TaskStatus::Developing).unwrap();
    assert_eq!(developing_only.len(), 1);
    assert_eq!(developing_only[0].title, "developing one");
}

#[test]
fn list_ids_returns_matching_task_ids() {
    let (_dir, store) = store();
    let pending = test_task(1_000);
    let mut developing = test_task(1_000);
    developing.status = TaskStatus::Developing;
    store.create(&pending).unwrap();
    store.create(&developing).unwrap();

    let ids = store.list_ids(&TaskFilter { status: Some(TaskStatus::Developing) }).unwrap();
    assert_eq!(ids, vec![developing.id]);
}

#[test]
fn update_applies_patch_and_refreshes_index() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    store.create(&task).unwrap();
    store.update(&task.id, |t| t.status = TaskStatus::Completed).unwrap();

    let completed = store.list_by_status(TaskStatus::Completed).unwrap();
    assert_eq!(completed.len(), 1);
}

#[test]
fn delete_removes_task_and_index_entry() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    store.create(&task).unwrap();
    store.delete(&task.id).unwrap();

    assert!(store.get(&task.id).unwrap().is_none());
    assert!(store.list(&TaskFilter::default()).unwrap().is_empty());
}

#[test]
fn corrupt_index_rebuilds_from_directory_scan() {
    let (dir, store) = store();
    let task = test_task(1_000);
    store.create(&task).unwrap();
    std::fs::write(dir.path().join("tasks").join("index.json"), b"{not json").unwrap();

    let summaries = store.list(&TaskFilter::default()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].title, task.title);
}

#[test]
fn process_info_round_trips_and_clears() {
    let (_dir, store) = store();
    let task = test_task(1_000);
    store.create(&task).unwrap();
    let info = oj_core::ProcessInfo::running(1234, 1_000);
    store.set_process(&task.id, &info).unwrap();
    assert_eq!(store.get_process(&task.id).unwrap().unwrap(), info);

    store.clear_process(&task.id).unwrap();
    assert!(store.get_process(&task.id).unwrap().is_none());
}
