//! Task store (spec §4.3): CRUD over task.json, process-info, and a
//! derived index.

use std::collections::HashMap;

use oj_core::{ProcessInfo, Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

use crate::atomic::{read_json, read_json_opt, remove_file_tolerant, write_json, Read};
use crate::error::{Result, StorageError};
use crate::paths::DataRoot;

/// One row of `tasks/index.json` (spec §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub title: String,
    pub status: TaskStatus,
    pub priority: oj_core::Priority,
    pub created_at_ms: u64,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            status: task.status,
            priority: task.priority,
            created_at_ms: task.created_at_ms,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskIndex {
    #[serde(flatten)]
    entries: HashMap<TaskId, TaskSummary>,
}

/// Optional filter for [`TaskStore::list`].
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

pub struct TaskStore {
    root: DataRoot,
}

impl TaskStore {
    pub fn new(root: DataRoot) -> Self {
        Self { root }
    }

    pub fn create(&self, task: &Task) -> Result<()> {
        write_json(&self.root.task_json(&task.id), task)?;
        self.upsert_index_entry(&task.id, TaskSummary::from(task))
    }

    pub fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        read_json_opt(&self.root.task_json(id))
    }

    /// Apply `patch` to the stored task and persist it, refreshing the index.
    pub fn update(&self, id: &TaskId, patch: impl FnOnce(&mut Task)) -> Result<Task> {
        let mut task = self
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(format!("task {id}")))?;
        patch(&mut task);
        write_json(&self.root.task_json(id), &task)?;
        self.upsert_index_entry(id, TaskSummary::from(&task))?;
        Ok(task)
    }

    pub fn delete(&self, id: &TaskId) -> Result<()> {
        let dir = self.root.task_dir(id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| StorageError::io(dir.display().to_string(), e))?;
        }
        self.remove_index_entry(id)
    }

    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<TaskSummary>> {
        let index = self.load_index()?;
        Ok(index
            .entries
            .into_values()
            .filter(|summary| filter.status.map(|s| s == summary.status).unwrap_or(true))
            .collect())
    }

    pub fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskSummary>> {
        self.list(&TaskFilter { status: Some(status) })
    }

    /// Like [`Self::list`] but keeps each summary's id, for callers (e.g.
    /// crash recovery) that need to act on the matching tasks.
    pub fn list_ids(&self, filter: &TaskFilter) -> Result<Vec<TaskId>> {
        let index = self.load_index()?;
        Ok(index
            .entries
            .into_iter()
            .filter(|(_, summary)| filter.status.map(|s| s == summary.status).unwrap_or(true))
            .map(|(id, _)| id)
            .collect())
    }

    pub fn get_process(&self, id: &TaskId) -> Result<Option<ProcessInfo>> {
        read_json_opt(&self.root.process_json(id))
    }

    pub fn set_process(&self, id: &TaskId, info: &ProcessInfo) -> Result<()> {
        write_json(&self.root.process_json(id), info)
    }

    pub fn clear_process(&self, id: &TaskId) -> Result<()> {
        remove_file_tolerant(&self.root.process_json(id))
    }

    /// `signal(pid, 0)` probe; false on permission-denied or not-found
    /// (spec §4.3).
    #[cfg(unix)]
    pub fn is_process_running(pid: u32) -> bool {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        matches!(nix::sys::signal::kill(pid, None), Ok(()))
    }

    #[cfg(not(unix))]
    pub fn is_process_running(_pid: u32) -> bool {
        false
    }

    /// `SIGTERM` the owner (spec §4.13 "stop"). Returns `false` if the pid
    /// was already gone, which callers treat as nothing further to do.
    #[cfg(unix)]
    pub fn stop_process(pid: u32) -> bool {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM).is_ok()
    }

    #[cfg(not(unix))]
    pub fn stop_process(_pid: u32) -> bool {
        false
    }

    fn load_index(&self) -> Result<TaskIndex> {
        match read_json(&self.root.index_json())? {
            Read::Present(index) => Ok(index),
            Read::Absent => Ok(TaskIndex::default()),
            Read::Corrupt(message) => {
                tracing::warn!(%message, "tasks/index.json corrupt, rebuilding by directory scan");
                self.rebuild_index()
            }
        }
    }

    /// Rebuild the index by scanning `tasks/*/task.json` (spec §4.3 "On
    /// index corruption, rebuild by directory scan").
    fn rebuild_index(&self) -> Result<TaskIndex> {
        let mut index = TaskIndex::default();
        for id in self
            .root
            .scan_task_ids()
            .map_err(|e| StorageError::io(self.root.tasks_dir().display().to_string(), e))?
        {
            if let Some(task) = self.get(&id)? {
                index.entries.insert(id, TaskSummary::from(&task));
            }
        }
        write_json(&self.root.index_json(), &index)?;
        Ok(index)
    }

    fn upsert_index_entry(&self, id: &TaskId, summary: TaskSummary) -> Result<()> {
        let mut index = self.load_index()?;
        index.entries.insert(*id, summary);
        write_json(&self.root.index_json(), &index)
    }

    fn remove_index_entry(&self, id: &TaskId) -> Result<()> {
        let mut index = self.load_index()?;
        index.entries.remove(id);
        write_json(&self.root.index_json(), &index)
    }
}

#[cfg(test)]
#[path = "task_store_tests.rs"]
mod tests;
