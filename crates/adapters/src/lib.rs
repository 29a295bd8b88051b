//! oj-adapters: the pluggable collaborators named in spec §6 — an LLM
//! backend, a workflow synthesizer, and a human-approval front-end.
//!
//! The engine only ever calls through these traits; it never depends on a
//! concrete backend. Each trait ships one fake implementation here for
//! tests; real backends (a CLI wrapper, a hosted API client) are a
//! separate crate's problem.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod approval;
pub mod backend;
pub mod synthesizer;

pub use approval::{ApprovalDecision, ApprovalFront, FakeApprovalFront};
pub use backend::{Backend, BackendError, FakeBackend, InvokeRequest, InvokeResponse};
pub use synthesizer::{FakeSynthesizer, WorkflowSynthesizer};
