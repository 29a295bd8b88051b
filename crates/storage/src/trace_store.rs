//! Trace store (spec §4.5): durable, append-only per-trace span log.

use std::io::Write;

use oj_core::{SpanId, SpanKind, SpanStatus, TaskId, TraceId, TraceSpan};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::paths::DataRoot;

pub struct TraceStore {
    root: DataRoot,
}

/// Aggregate view over one trace's spans (spec §4.5 `getTrace`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub span_count: usize,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub llm_call_count: usize,
    pub total_duration_ms: u64,
    pub status: SpanStatus,
    pub root_span_id: Option<SpanId>,
}

impl TraceStore {
    pub fn new(root: DataRoot) -> Self {
        Self { root }
    }

    /// Append one span line. No locking: `spanId` is globally unique and
    /// each line is a single whole-line write, well under `PIPE_BUF`
    /// (spec §4.5).
    pub fn append_span(&self, task_id: &TaskId, span: &TraceSpan) -> Result<()> {
        let path = self.root.trace_jsonl(task_id, &span.trace_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent.display().to_string(), e))?;
        }
        let mut line = serde_json::to_vec(span)
            .map_err(|e| StorageError::Internal(format!("serialize span: {e}")))?;
        line.push(b'\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(path.display().to_string(), e))?;
        file.write_all(&line).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Ok(())
    }

    fn read_spans(&self, task_id: &TaskId, trace_id: &TraceId) -> Result<Vec<TraceSpan>> {
        let path = self.root.trace_jsonl(task_id, trace_id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
        };
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    pub fn get_trace(&self, task_id: &TaskId, trace_id: &TraceId) -> Result<TraceSummary> {
        let spans = self.read_spans(task_id, trace_id)?;

        let total_tokens = spans
            .iter()
            .filter(|s| s.kind == SpanKind::Llm)
            .filter_map(|s| s.token_usage.map(|t| t.total()))
            .sum();
        let total_cost_usd = spans.iter().filter_map(|s| s.cost_usd).sum();
        let llm_call_count = spans.iter().filter(|s| s.kind == SpanKind::Llm).count();

        let root_span = spans.iter().find(|s| s.parent_span_id.is_none());
        let total_duration_ms = root_span
            .and_then(|s| s.duration_ms)
            .unwrap_or_else(|| duration_from_span_extent(&spans));

        let status = if spans.iter().any(|s| s.status == SpanStatus::Error) {
            SpanStatus::Error
        } else if spans.iter().any(|s| s.status == SpanStatus::Running) {
            SpanStatus::Running
        } else {
            SpanStatus::Ok
        };

        Ok(TraceSummary {
            span_count: spans.len(),
            total_tokens,
            total_cost_usd,
            llm_call_count,
            total_duration_ms,
            status,
            root_span_id: root_span.map(|s| s.span_id),
        })
    }

    pub fn list_traces(&self, task_id: &TaskId) -> Result<Vec<TraceId>> {
        let dir = self.root.traces_dir(task_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| StorageError::io(dir.display().to_string(), e))? {
            let entry = entry.map_err(|e| StorageError::io(dir.display().to_string(), e))?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(TraceId::from_string(stem));
            }
        }
        Ok(ids)
    }

    /// Spans whose duration is at least `min_duration_ms`, sorted longest
    /// first, truncated to `limit` (spec §4.5 `querySlowSpans`).
    pub fn query_slow_spans(
        &self,
        task_id: &TaskId,
        trace_id: &TraceId,
        min_duration_ms: u64,
        limit: usize,
    ) -> Result<Vec<TraceSpan>> {
        let mut spans: Vec<TraceSpan> = self
            .read_spans(task_id, trace_id)?
            .into_iter()
            .filter(|s| s.duration_ms.unwrap_or(0) >= min_duration_ms)
            .collect();
        spans.sort_by(|a, b| b.duration_ms.unwrap_or(0).cmp(&a.duration_ms.unwrap_or(0)));
        spans.truncate(limit);
        Ok(spans)
    }

    /// Walk parent links from `span_id` up to the root, root-first
    /// (spec §4.5 `getErrorChain`).
    pub fn get_error_chain(&self, task_id: &TaskId, trace_id: &TraceId, span_id: &SpanId) -> Result<Vec<TraceSpan>> {
        let spans = self.read_spans(task_id, trace_id)?;
        let mut chain = Vec::new();
        let mut current = spans.iter().find(|s| s.span_id == *span_id);
        while let Some(span) = current {
            chain.push(span.clone());
            current = span.parent_span_id.and_then(|parent_id| spans.iter().find(|s| s.span_id == parent_id));
        }
        chain.reverse();
        Ok(chain)
    }
}

fn duration_from_span_extent(spans: &[TraceSpan]) -> u64 {
    let min_start = spans.iter().map(|s| s.start_time_ms).min();
    let max_end = spans.iter().filter_map(|s| s.end_time_ms).max();
    match (min_start, max_end) {
        (Some(start), Some(end)) => end.saturating_sub(start),
        _ => 0,
    }
}

#[cfg(test)]
#[path = "trace_store_tests.rs"]
mod tests;
