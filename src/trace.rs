//! Trace events and run result envelopes.
//!
//! Every execution mode (dry run, sandbox, live) appends `TraceEvent`s to a
//! `TraceBuilder` and finishes by folding them into a `RunResult`. Event ids
//! are assigned from a monotonic per-run counter starting at 0 and are the
//! only ordering clients may rely on; timestamps are advisory.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum preview rows carried on a single resultset event.
pub const MAX_PREVIEW_ROWS: usize = 50;

/// Rows retained per table in the sandbox data preview.
pub const TABLE_PREVIEW_ROWS: usize = 3;

/// Trace event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "simulated")]
    Simulated,
    #[serde(rename = "branch")]
    Branch,
    #[serde(rename = "resultset")]
    Resultset,
    #[serde(rename = "dml")]
    Dml,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "txn")]
    Txn,
    #[serde(rename = "statement")]
    Statement,
    #[serde(rename = "control-flow")]
    ControlFlow,
    #[serde(rename = "complete")]
    Complete,
}

/// One entry in a run's execution trace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub event_id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub sql_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_taken: Option<String>,
    pub duration_ms: u64,
}

/// Accumulates trace events for one run, assigning monotonic ids.
#[derive(Debug)]
pub struct TraceBuilder {
    events: Vec<TraceEvent>,
    started: Instant,
}

impl TraceBuilder {
    /// Create a builder and emit the opening `start` event.
    pub fn start(label: &str) -> Self {
        let mut builder = Self {
            events: Vec::new(),
            started: Instant::now(),
        };
        builder.push(EventType::Start).sql_text = label.to_string();
        builder
    }

    /// Append an event of the given type; id and timestamp are assigned here.
    /// Remaining fields are set through the returned reference.
    pub fn push(&mut self, event_type: EventType) -> &mut TraceEvent {
        let event = TraceEvent {
            event_id: self.events.len() as u64,
            timestamp: Utc::now(),
            node_id: None,
            event_type,
            sql_text: String::new(),
            row_count: None,
            error_number: None,
            error_message: None,
            columns: None,
            rows: None,
            branch_taken: None,
            duration_ms: 0,
        };
        self.events.push(event);
        self.events.last_mut().unwrap()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Emit the terminal `complete` event and consume the builder.
    pub fn complete(mut self, note: &str) -> Vec<TraceEvent> {
        let elapsed = self.elapsed_ms();
        let event = self.push(EventType::Complete);
        event.sql_text = note.to_string();
        event.duration_ms = elapsed;
        self.events
    }
}

/// Aggregated outcome of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_statements: u64,
    pub total_rows_affected: i64,
    pub total_duration_ms: u64,
    pub had_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub mode: String,
}

/// Per-table preview included in sandbox metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub row_count: i64,
}

/// Sandbox-only metadata on the run result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteMetadata {
    pub data_preview: std::collections::BTreeMap<String, TablePreview>,
    pub tables_created: Vec<String>,
    pub total_rows_generated: i64,
}

/// The external result of a run in any mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    pub summary: RunSummary,
    pub trace: Vec<TraceEvent>,
    pub executed_nodes: Vec<String>,
    pub executed_edges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_metadata: Option<SqliteMetadata>,
}

impl RunResult {
    /// Assemble a result from a finished trace.
    ///
    /// `total_statements` counts `statement` and `simulated` events;
    /// rows-affected sums the `dml` event counts; error state reflects the
    /// first `error` event.
    pub fn from_trace(
        mode: &str,
        trace: Vec<TraceEvent>,
        executed_nodes: BTreeSet<String>,
        executed_edges: BTreeSet<String>,
    ) -> Self {
        let total_statements = trace
            .iter()
            .filter(|e| matches!(e.event_type, EventType::Statement | EventType::Simulated))
            .count() as u64;
        let total_rows_affected = trace
            .iter()
            .filter(|e| e.event_type == EventType::Dml)
            .filter_map(|e| e.row_count)
            .sum();
        let total_duration_ms = trace
            .last()
            .map(|e| e.duration_ms)
            .unwrap_or_default();
        let first_error = trace
            .iter()
            .find(|e| e.event_type == EventType::Error)
            .and_then(|e| e.error_message.clone());

        RunResult {
            run_id: new_run_id(),
            summary: RunSummary {
                total_statements,
                total_rows_affected,
                total_duration_ms,
                had_error: first_error.is_some(),
                error_message: first_error,
                mode: mode.to_string(),
            },
            trace,
            executed_nodes: executed_nodes.into_iter().collect(),
            executed_edges: executed_edges.into_iter().collect(),
            sqlite_metadata: None,
        }
    }
}

/// Generate a 12-character lowercase hex run id.
pub fn new_run_id() -> String {
    let bits: u64 = rand::thread_rng().gen();
    format!("{:012x}", bits & 0xFFFF_FFFF_FFFF)
}

/// Format an executed-edge key as used in `RunResult::executed_edges`.
#[inline]
pub fn edge_key(source: &str, target: &str) -> String {
    format!("{}->{}", source, target)
}
