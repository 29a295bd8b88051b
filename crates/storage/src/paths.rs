//! Data root resolution and the on-disk path layout (spec §4.1).

use std::path::{Path, PathBuf};

use oj_core::{TaskId, TraceId};

/// Resolve the data root once per process (spec §4.1): `DATA_DIR` env var,
/// else `./.data`, else a home-directory fallback.
pub fn resolve_data_root() -> PathBuf {
    if let Ok(dir) = std::env::var("DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let cwd_default = PathBuf::from(".data");
    if cwd_default.parent().map(|p| p.exists()).unwrap_or(true) {
        return cwd_default;
    }
    dirs::home_dir()
        .map(|h| h.join(".oddjobs"))
        .unwrap_or(cwd_default)
}

/// Stable root for the process lifetime, plus the per-task/global path
/// conventions layered over it.
#[derive(Debug, Clone)]
pub struct DataRoot(PathBuf);

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self(root.into())
    }

    pub fn resolve() -> Self {
        Self(resolve_data_root())
    }

    pub fn root(&self) -> &Path {
        &self.0
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.0.join("tasks")
    }

    pub fn task_dir(&self, id: &TaskId) -> PathBuf {
        self.tasks_dir().join(id.as_str())
    }

    pub fn task_json(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("task.json")
    }

    pub fn workflow_json(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("workflow.json")
    }

    pub fn instance_json(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("instance.json")
    }

    pub fn process_json(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("process.json")
    }

    pub fn messages_json(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("messages.json")
    }

    pub fn stats_json(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("stats.json")
    }

    pub fn timeline_json(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("timeline.json")
    }

    pub fn logs_dir(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("logs")
    }

    pub fn outputs_dir(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("outputs")
    }

    pub fn traces_dir(&self, id: &TaskId) -> PathBuf {
        self.task_dir(id).join("traces")
    }

    pub fn trace_jsonl(&self, task_id: &TaskId, trace_id: &TraceId) -> PathBuf {
        self.traces_dir(task_id).join(format!("{trace_id}.jsonl"))
    }

    pub fn queue_json(&self) -> PathBuf {
        self.0.join("queue.json")
    }

    /// Critical-section lock guarding `queue.json` mutations (spec §4.7),
    /// distinct from [`Self::runner_lock`].
    pub fn queue_lock(&self) -> PathBuf {
        self.0.join("queue.json.lock")
    }

    /// Queue-runner PID lock: enforces a single daemon/queue-runner instance.
    pub fn runner_lock(&self) -> PathBuf {
        self.0.join("runner.lock")
    }

    pub fn index_json(&self) -> PathBuf {
        self.tasks_dir().join("index.json")
    }

    pub fn meta_json(&self) -> PathBuf {
        self.0.join("meta.json")
    }

    /// Every task directory currently present, for index-rebuild-by-scan
    /// (spec §4.3) and crash recovery (spec §4.12).
    pub fn scan_task_ids(&self) -> std::io::Result<Vec<TaskId>> {
        let dir = self.tasks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(TaskId::from_string(name));
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
