//! Atomic JSON read/write over the path layout (spec §4.1).

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StorageError};

/// Outcome of reading a JSON document that might not exist or might be
/// unparseable (spec §4.1: "reads return a sentinel absent ... corrupt").
pub enum Read<T> {
    Present(T),
    Absent,
    Corrupt(String),
}

/// Read and deserialize `path`, distinguishing missing-file from
/// unparseable-JSON so callers can decide whether to recover or fail.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Read<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Read::Absent),
        Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Read::Present(value)),
        Err(e) => Ok(Read::Corrupt(e.to_string())),
    }
}

/// Write `value` to `path` atomically: serialize to `path.tmp`, then rename
/// over `path` (atomic on POSIX). Creates parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent.display().to_string(), e))?;
    }
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| StorageError::Internal(format!("serialize {}: {e}", path.display())))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &bytes).map_err(|e| StorageError::io(tmp.display().to_string(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::io(path.display().to_string(), e))?;
    Ok(())
}

/// Convenience wrapper over [`read_json`] that treats both absent and
/// corrupt documents as "nothing usable", for callers that only need `None`.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_json(path)? {
        Read::Present(value) => Ok(Some(value)),
        Read::Absent | Read::Corrupt(_) => Ok(None),
    }
}

pub fn remove_file_tolerant(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path.display().to_string(), e)),
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
