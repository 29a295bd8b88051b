//! Global PID lock (spec §3 "Global PID lock"): single-writer lock for the
//! daemon/queue-runner process, distinct from the queue's own file lock
//! ([`crate::lock`]). Grounded on the teacher's `try_lock_exclusive` +
//! PID-file startup pattern, generalized to the spec's own stale-lock
//! protocol so it shares behavior with [`crate::lock::FileLock`].

use serde::{Deserialize, Serialize};

use crate::atomic::{read_json_opt, write_json};
use crate::error::Result;
use crate::lock::FileLock;
use crate::paths::DataRoot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidLockInfo {
    pub pid: u32,
    pub started_at_ms: u64,
}

/// Held PID lock. Dropping without calling [`Self::release`] leaks the
/// lock file — callers are expected to hold this for the process lifetime
/// and release it on clean shutdown.
pub struct PidLock {
    inner: FileLock,
}

impl PidLock {
    /// Acquire the well-known `runner.lock`, recording `(pid, startedAt)`.
    pub fn acquire(root: &DataRoot, now_ms: u64) -> Result<Self> {
        let path = root.runner_lock();
        let inner = FileLock::acquire(&path)?;
        write_json(&path, &PidLockInfo { pid: std::process::id(), started_at_ms: now_ms })?;
        Ok(Self { inner })
    }

    pub fn current(root: &DataRoot) -> Result<Option<PidLockInfo>> {
        read_json_opt(&root.runner_lock())
    }

    pub fn release(self) -> Result<()> {
        self.inner.release()
    }
}

#[cfg(test)]
#[path = "pid_lock_tests.rs"]
mod tests;
