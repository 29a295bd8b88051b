//! Daemon configuration: env-var-first, typed defaults (spec §4.1), in the
//! style of the teacher's `crates/daemon/src/env.rs` and
//! `crates/daemon/src/lifecycle/mod.rs`'s `Config::load`.

use std::path::PathBuf;

use oj_engine::WorkerConfig;
use oj_storage::paths::DataRoot;

/// Everything `main` needs to stand up the stores, the worker pool, and
/// the approval-poll loop.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (spec §4.1: `DATA_DIR`, else `./.data`, else
    /// `$HOME/.oj/data`).
    pub data_dir: PathBuf,
    pub worker: WorkerConfig,
    /// How often to drain jobs waiting on human approval (ms).
    pub approval_poll_interval_ms: u64,
}

impl Config {
    /// Load from the environment, following the teacher's "env var with a
    /// typed default" convention for every tunable.
    pub fn load() -> Self {
        Self {
            data_dir: data_dir(),
            worker: WorkerConfig {
                poll_interval_ms: env_u64("OJ_POLL_INTERVAL_MS").unwrap_or(200),
                idle_wait_ms: env_u64("OJ_IDLE_WAIT_MS").unwrap_or(500),
                global_slots: env_u64("OJ_GLOBAL_SLOTS").map(|n| n as usize).unwrap_or(10),
            },
            approval_poll_interval_ms: env_u64("OJ_APPROVAL_POLL_INTERVAL_MS").unwrap_or(1_000),
        }
    }

    pub fn data_root(&self) -> DataRoot {
        DataRoot::new(self.data_dir.clone())
    }
}

/// `DATA_DIR` > `./.data` > `$HOME/.oj/data`, mirroring
/// `oj_storage::paths::resolve_data_root` exactly (spec §4.1) since the
/// daemon needs the same resolution the storage crate's own default uses,
/// just exposed as part of a typed `Config` rather than a bare function
/// call sprinkled through `main`.
fn data_dir() -> PathBuf {
    oj_storage::paths::resolve_data_root()
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
