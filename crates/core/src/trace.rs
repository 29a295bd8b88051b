//! Trace span: one step of execution within a task (spec §3 "Trace span").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::task::TaskId;

crate::define_id! {
    /// Identifier for a trace (one per task execution attempt).
    pub struct TraceId("trc-");
}

crate::define_id! {
    /// Identifier for one span within a trace.
    pub struct SpanId("span-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Workflow,
    Node,
    Llm,
    Other,
}

crate::simple_display! {
    SpanKind {
        Workflow => "workflow",
        Node => "node",
        Llm => "llm",
        Other => "other",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
    Running,
}

crate::simple_display! {
    SpanStatus {
        Ok => "ok",
        Error => "error",
        Running => "running",
    }
}

/// Closed classification of span errors this system actually produces
/// (SPEC_FULL §C.1): the LLM backend's own `{timeout, cancelled, process}`
/// (spec §6), plus `validation` for expression-evaluator failures and a
/// catch-all `internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Cancelled,
    Process,
    Validation,
    Internal,
}

crate::simple_display! {
    ErrorCategory {
        Timeout => "timeout",
        Cancelled => "cancelled",
        Process => "process",
        Validation => "validation",
        Internal => "internal",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanError {
    pub message: String,
    pub category: ErrorCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One step of execution within a task (spec §3 "Trace span"). Immutable
/// once written — append-only JSONL per `trace_id` (spec §4.5, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub status: SpanStatus,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SpanError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

impl TraceSpan {
    pub fn start(trace_id: TraceId, name: impl Into<String>, kind: SpanKind, now_ms: u64) -> Self {
        Self {
            trace_id,
            span_id: SpanId::new(),
            parent_span_id: None,
            name: name.into(),
            kind,
            start_time_ms: now_ms,
            end_time_ms: None,
            duration_ms: None,
            status: SpanStatus::Running,
            attributes: HashMap::new(),
            error: None,
            token_usage: None,
            cost_usd: None,
        }
    }

    pub fn with_parent(mut self, parent: SpanId) -> Self {
        self.parent_span_id = Some(parent);
        self
    }

    pub fn finish_ok(mut self, now_ms: u64) -> Self {
        self.end_time_ms = Some(now_ms);
        self.duration_ms = Some(now_ms.saturating_sub(self.start_time_ms));
        self.status = SpanStatus::Ok;
        self
    }

    pub fn finish_error(mut self, now_ms: u64, error: SpanError) -> Self {
        self.end_time_ms = Some(now_ms);
        self.duration_ms = Some(now_ms.saturating_sub(self.start_time_ms));
        self.status = SpanStatus::Error;
        self.error = Some(error);
        self
    }
}

/// A span plus the task it belongs to — the unit appended to
/// `tasks/{taskId}/traces/{traceId}.jsonl` (spec §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpanRecord {
    pub task_id: TaskId,
    pub span: TraceSpan,
}

#[cfg(test)]
#[path = "trace_tests.rs"]
mod tests;
