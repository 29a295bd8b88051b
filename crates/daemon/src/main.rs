//! `ojd`: the orchestrator daemon process (spec §4.1, §4.12).
//!
//! Grounded on the teacher's `crates/daemon/src/lifecycle/startup.rs`:
//! create the state directory, acquire the single-writer PID lock, run
//! crash recovery, then start serving — trimmed of the Unix-socket IPC
//! listener (a CLI protocol is out of scope here) and the WAL/snapshot
//! machinery (`oj-storage` persists every mutation directly instead of
//! replaying an event log, so there is nothing to replay at startup
//! beyond the crash-recovery pass).

mod config;

use std::sync::Arc;

use config::Config;
use oj_adapters::{FakeApprovalFront, FakeBackend, FakeSynthesizer};
use oj_core::{Clock, SystemClock};
use oj_engine::{recovery, Engine};
use oj_storage::{PidLock, Queue, TaskStore, WorkflowStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    if let Err(error) = run(config).await {
        error!(%error, "daemon exited with an error");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error("failed to create data directory: {0}")]
    CreateDataDir(#[source] std::io::Error),
    #[error(transparent)]
    Storage(#[from] oj_storage::StorageError),
    #[error(transparent)]
    Engine(#[from] oj_engine::EngineError),
}

async fn run(config: Config) -> Result<(), DaemonError> {
    std::fs::create_dir_all(&config.data_dir).map_err(DaemonError::CreateDataDir)?;
    let root = config.data_root();
    let now_ms = SystemClock.epoch_ms();

    let lock = PidLock::acquire(&root, now_ms)?;
    info!(data_dir = %config.data_dir.display(), pid = std::process::id(), "acquired runner lock");

    let task_store = Arc::new(TaskStore::new(root.clone()));
    let workflow_store = Arc::new(WorkflowStore::new(root.clone()));
    let queue = Arc::new(Queue::new(root.clone()));

    let orphans = recovery::run(&task_store, &workflow_store, &queue, now_ms)?;
    if orphans.is_empty() {
        info!("crash recovery: no orphaned tasks found");
    } else {
        warn!(count = orphans.len(), "crash recovery: reconciled orphaned task(s)");
        for orphan in &orphans {
            warn!(task_id = %orphan.task_id, previous_status = ?orphan.previous_task_status, "task reconciled after crash");
        }
    }

    // No real LLM backend or workflow synthesizer ships in this workspace
    // (spec §6 treats both as external collaborators; a concrete backend
    // is "a separate crate's problem" per `oj-adapters`'s own doc comment).
    // The fakes are the only implementations available, so they are wired
    // in here as the production stand-in until a real adapter crate exists.
    let backend = Arc::new(FakeBackend::new(true));
    let synthesizer = Arc::new(FakeSynthesizer);
    let approval_front = Arc::new(FakeApprovalFront::new());

    let engine = Arc::new(Engine::new(
        task_store,
        workflow_store,
        queue,
        backend,
        synthesizer,
        approval_front,
        config.worker,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));
    tokio::spawn(poll_approvals_loop(engine.clone(), config.approval_poll_interval_ms, shutdown.clone()));

    info!("daemon ready");
    engine.run(&SystemClock, shutdown).await;

    info!("daemon shutting down");
    lock.release()?;
    Ok(())
}

async fn poll_approvals_loop<B: oj_adapters::Backend>(
    engine: Arc<Engine<B>>,
    interval_ms: u64,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let now_ms = SystemClock.epoch_ms();
                if let Err(error) = engine.poll_approvals(now_ms).await {
                    error!(%error, "approval poll failed");
                }
            }
        }
    }
}

async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(error) => {
                error!(%error, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
    shutdown.cancel();
}
