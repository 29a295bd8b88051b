//! Cross-process file lock with stale-lock recovery (spec §4.2).
//!
//! Distinct from the daemon's own PID lock ([`crate::pid_lock`]): this one
//! guards a single critical section (the queue document) and is taken and
//! released many times per process lifetime, so it needs the staleness and
//! retry protocol the daemon's own one-shot lock does not.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StorageError};

const MAX_RETRIES: u32 = 10;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);
const STALE_AFTER: Duration = Duration::from_secs(30);

/// In-process re-entrancy guard: a single process holding the lock once
/// must not block itself trying to acquire it again (spec §4.2 "Lock
/// acquisition is idempotent within a single process").
static HELD: Mutex<Option<HashSet<PathBuf>>> = Mutex::new(None);

fn mark_held(path: &Path) -> bool {
    let mut guard = HELD.lock();
    let set = guard.get_or_insert_with(HashSet::new);
    set.insert(path.to_path_buf())
}

fn mark_released(path: &Path) {
    let mut guard = HELD.lock();
    if let Some(set) = guard.as_mut() {
        set.remove(path);
    }
}

fn already_held(path: &Path) -> bool {
    HELD.lock().as_ref().map(|set| set.contains(path)).unwrap_or(false)
}

/// A held lock on `path`; dropping it does not release the file (use
/// [`FileLock::release`] explicitly, matching the spec's CRUD-style API).
pub struct FileLock {
    path: PathBuf,
    reentrant: bool,
}

impl FileLock {
    /// Acquire the lock at `path`, retrying per the spec's protocol:
    /// exclusive-create, stale-mtime (> 30s) single retry, bounded 10x
    /// 100ms backoff overall.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if already_held(&path) {
            return Ok(Self { path, reentrant: true });
        }

        for attempt in 0..MAX_RETRIES {
            match try_create_exclusive(&path) {
                Ok(()) => {
                    mark_held(&path);
                    return Ok(Self { path, reentrant: false });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        let _ = std::fs::remove_file(&path);
                        if try_create_exclusive(&path).is_ok() {
                            mark_held(&path);
                            return Ok(Self { path, reentrant: false });
                        }
                    }
                }
                Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
            }
            if attempt + 1 < MAX_RETRIES {
                std::thread::sleep(RETRY_BACKOFF);
            }
        }

        Err(StorageError::LockContention(path.display().to_string()))
    }

    pub fn release(self) -> Result<()> {
        if self.reentrant {
            return Ok(());
        }
        mark_released(&self.path);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(self.path.display().to_string(), e)),
        }
    }
}

fn try_create_exclusive(path: &Path) -> io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}

/// Run `body` inside the lock at `path`, releasing it (on any outcome)
/// before returning.
pub fn with_lock<T>(path: impl AsRef<Path>, body: impl FnOnce() -> Result<T>) -> Result<T> {
    let path = path.as_ref();
    let lock = FileLock::acquire(path)?;
    let result = body();
    lock.release()?;
    result
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
