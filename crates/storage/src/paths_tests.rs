use oj_core::TaskId;
use tempfile::TempDir;

use super::*;

#[test]
fn task_paths_nest_under_tasks_dir() {
    let dir = TempDir::new().unwrap();
    let root = DataRoot::new(dir.path());
    let id = TaskId::new();
    assert_eq!(root.task_json(&id), root.task_dir(&id).join("task.json"));
    assert!(root.task_dir(&id).starts_with(root.tasks_dir()));
}

#[test]
fn scan_task_ids_returns_empty_when_tasks_dir_absent() {
    let dir = TempDir::new().unwrap();
    let root = DataRoot::new(dir.path());
    assert!(root.scan_task_ids().unwrap().is_empty());
}

#[test]
fn scan_task_ids_lists_existing_directories() {
    let dir = TempDir::new().unwrap();
    let root = DataRoot::new(dir.path());
    let id = TaskId::new();
    std::fs::create_dir_all(root.task_dir(&id)).unwrap();
    let found = root.scan_task_ids().unwrap();
    assert_eq!(found, vec![id]);
}

#[test]
fn data_dir_env_var_takes_priority() {
    let dir = TempDir::new().unwrap();
    std::env::set_var("DATA_DIR", dir.path());
    assert_eq!(resolve_data_root(), dir.path());
    std::env::remove_var("DATA_DIR");
}
