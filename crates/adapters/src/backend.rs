//! LLM backend (spec §6): a single `invoke` call plus `checkAvailable`.
//! Grounded on `crates/adapters/src/agent/coop/adapter.rs`'s
//! `AgentAdapter` trait shape (one async trait, `async-trait`, a fake
//! implementation as the only test double), trimmed to exactly the two
//! methods the core calls.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Everything a node's prompt invocation needs (spec §6 `invoke` params).
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub prompt: String,
    pub cwd: String,
    pub stream: bool,
    pub skip_permissions: bool,
    pub timeout_ms: u64,
    pub session_id: Option<String>,
    pub model: Option<String>,
}

impl InvokeRequest {
    pub fn new(prompt: impl Into<String>, cwd: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            prompt: prompt.into(),
            cwd: cwd.into(),
            stream: false,
            skip_permissions: false,
            timeout_ms,
            session_id: None,
            model: None,
        }
    }
}

/// Success payload (spec §6 `invoke` Ok variant).
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeResponse {
    pub prompt: String,
    pub response: String,
    pub duration_ms: u64,
    pub session_id: String,
    pub duration_api_ms: Option<u64>,
    pub cost_usd: Option<f64>,
    pub slot_wait_ms: Option<u64>,
}

/// Closed error set the backend may raise (spec §6 `invoke` Err variant).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BackendError {
    #[error("invocation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("invocation cancelled")]
    Cancelled,
    #[error("backend process error: {message}")]
    Process { message: String, exit_code: Option<i32> },
}

/// The pluggable collaborator the core calls to run one prompt (spec §6
/// "The core calls only these two; adapters map to external CLIs or APIs").
#[async_trait]
pub trait Backend: Send + Sync {
    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse, BackendError>;

    async fn check_available(&self) -> bool;
}

/// Scripted fake backend for engine/storage tests: replays a queue of
/// canned responses (or the configured failure) without touching a real
/// LLM, grounded on `crates/adapters/src/agent/fake.rs`'s scripted-response
/// style.
pub struct FakeBackend {
    responses: Mutex<VecDeque<Result<InvokeResponse, BackendError>>>,
    available: bool,
    latency: Duration,
}

impl FakeBackend {
    pub fn new(available: bool) -> Self {
        Self { responses: Mutex::new(VecDeque::new()), available, latency: Duration::ZERO }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_response(&self, response: InvokeResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    pub fn push_error(&self, error: BackendError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Canned success echoing the prompt back, for tests that only care
    /// that a node ran.
    pub fn echo(prompt: impl Into<String>) -> InvokeResponse {
        let prompt = prompt.into();
        InvokeResponse {
            response: format!("ok: {prompt}"),
            prompt,
            duration_ms: 1,
            session_id: "fake-session".into(),
            duration_api_ms: Some(1),
            cost_usd: Some(0.0),
            slot_wait_ms: Some(0),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse, BackendError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let queued = self.responses.lock().pop_front();
        queued.unwrap_or_else(|| Ok(FakeBackend::echo(request.prompt)))
    }

    async fn check_available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
