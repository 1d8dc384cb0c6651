//! SQLite sandbox: adapted execution of a T-SQL subset against an
//! in-memory engine with an inferred, seeded schema.
//!
//! The orchestrator runs one pass:
//!
//! 1. Extract the body and split it into top-level statements.
//! 2. Choose the taken IF/ELSE branch from the parameter bindings.
//! 3. Infer a schema from the adapted statements, create stub tables,
//!    seed them reproducibly.
//! 4. Execute on-branch statements one by one; engine errors become trace
//!    events and never abort the run.
//! 5. Correlate each executed statement back to its CFG node by a
//!    normalised 30-character prefix match.

mod adapter;
mod schema;
mod seeder;
mod splitter;

pub use adapter::{adapt_statement, bind_parameters};
pub use schema::{create_table_sql, infer_column_type, infer_schema, InferredSchema};
pub use seeder::{seed_tables, SeedReport, SEED};
pub use splitter::{
    collect_branch_lines, extract_body, split_statements, BranchArm, BranchLine, SplitStatement,
};

use std::collections::BTreeSet;
use std::time::Instant;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cfg::ControlFlowGraph;
use crate::params::ParamBindings;
use crate::predicate;
use crate::trace::{
    EventType, RunResult, SqliteMetadata, TablePreview, TraceBuilder, MAX_PREVIEW_ROWS,
    TABLE_PREVIEW_ROWS,
};
use crate::util::{normalize_ws, starts_with_ci, truncate_label};

/// The single branch the sandbox decides to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchChoice {
    If,
    ElseIf,
    Else,
    /// No decision possible; every statement is executed.
    Unknown,
}

/// Decide which IF/ELSE arm the bindings select.
///
/// The first condition that evaluates true wins. A bare ELSE wins when
/// every condition evaluated (to false). Any unpredictable condition with
/// no prior true verdict yields `Unknown`, which makes the sandbox execute
/// everything it cannot rule out.
pub fn select_branch(body: &str, bindings: &ParamBindings) -> BranchChoice {
    let lines = collect_branch_lines(body);
    if lines.is_empty() {
        return BranchChoice::Unknown;
    }

    let mut any_unpredictable = false;
    let mut has_else = false;

    for line in &lines {
        match (line.arm, &line.condition) {
            (BranchArm::If, Some(condition)) | (BranchArm::ElseIf, Some(condition)) => {
                match predicate::evaluate(condition, bindings) {
                    Some(true) => {
                        return if line.arm == BranchArm::If {
                            BranchChoice::If
                        } else {
                            BranchChoice::ElseIf
                        };
                    }
                    Some(false) => {}
                    None => any_unpredictable = true,
                }
            }
            (BranchArm::Else, _) => has_else = true,
            _ => {}
        }
    }

    if any_unpredictable {
        return BranchChoice::Unknown;
    }
    if has_else {
        return BranchChoice::Else;
    }
    BranchChoice::Unknown
}

/// Whether a statement found under `arm` runs when `choice` was selected.
pub(crate) fn on_branch(arm: Option<BranchArm>, choice: BranchChoice) -> bool {
    match (arm, choice) {
        (_, BranchChoice::Unknown) => true,
        (None, _) => true,
        (Some(BranchArm::If), BranchChoice::If) => true,
        (Some(BranchArm::ElseIf), BranchChoice::ElseIf) => true,
        (Some(BranchArm::Else), BranchChoice::Else) => true,
        _ => false,
    }
}

/// Locate the CFG node whose normalised snippet shares its first 30
/// characters with the normalised statement.
pub(crate) fn correlate_node(cfg: &ControlFlowGraph, sql: &str) -> Option<String> {
    const PREFIX: usize = 30;
    let needle: String = normalize_ws(sql).chars().take(PREFIX).collect();
    if needle.is_empty() {
        return None;
    }
    cfg.nodes
        .iter()
        .filter(|n| !n.sql_snippet.is_empty())
        .find(|n| {
            let snippet: String = normalize_ws(&n.sql_snippet).chars().take(PREFIX).collect();
            snippet == needle
        })
        .map(|n| n.id.clone())
}

/// Run the sandbox without external cancellation.
pub fn sandbox_run(
    cfg: &ControlFlowGraph,
    procedure_text: &str,
    bindings: &ParamBindings,
) -> RunResult {
    sandbox_run_with_cancel(cfg, procedure_text, bindings, &CancellationToken::new())
}

/// Run the sandbox, checking the cancellation token between statements.
pub fn sandbox_run_with_cancel(
    cfg: &ControlFlowGraph,
    procedure_text: &str,
    bindings: &ParamBindings,
    cancel: &CancellationToken,
) -> RunResult {
    let mut trace = TraceBuilder::start("sqlite sandbox");
    let mut executed_nodes: BTreeSet<String> = BTreeSet::new();
    let executed_edges: BTreeSet<String> = BTreeSet::new();

    let body = extract_body(procedure_text);
    let statements = split_statements(body);
    let choice = select_branch(body, bindings);
    debug!(?choice, statements = statements.len(), "sandbox plan");

    let adapted_body: String = statements
        .iter()
        .map(|s| adapt_statement(&s.text))
        .collect::<Vec<_>>()
        .join("\n");
    let inferred = infer_schema(&adapted_body);

    // Scoped connection: dropped on every exit path below
    let conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(e) => {
            let event = trace.push(EventType::Error);
            event.error_message = Some(format!("could not open sandbox engine: {}", e));
            let events = trace.complete("sandbox aborted");
            return RunResult::from_trace("sqlite", events, executed_nodes, executed_edges);
        }
    };

    let mut tables_created = Vec::new();
    for table in &inferred.tables {
        match conn.execute(&create_table_sql(table), []) {
            Ok(_) => tables_created.push(table.name.clone()),
            Err(e) => {
                let event = trace.push(EventType::Error);
                event.sql_text = create_table_sql(table);
                event.error_message = Some(e.to_string());
            }
        }
    }

    let seed_report = match seed_tables(&conn, &inferred) {
        Ok(report) => report,
        Err(e) => {
            let event = trace.push(EventType::Error);
            event.error_message = Some(format!("seeding failed: {}", e));
            SeedReport {
                rows_per_table: Vec::new(),
                total_rows: 0,
            }
        }
    };

    {
        let event = trace.push(EventType::Info);
        event.sql_text = format!(
            "sandbox ready: {} table(s), {} seeded row(s), branch = {:?}",
            tables_created.len(),
            seed_report.total_rows,
            choice
        );
    }

    let mut cancelled = false;
    for statement in &statements {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        if !on_branch(statement.arm, choice) {
            let event = trace.push(EventType::ControlFlow);
            event.sql_text = format!(
                "Skipped (branch not taken): {}",
                truncate_label(&normalize_ws(&statement.text), 60)
            );
            continue;
        }

        let node_id = correlate_node(cfg, &statement.text);
        if let Some(id) = &node_id {
            executed_nodes.insert(id.clone());
        }

        {
            let event = trace.push(EventType::Statement);
            event.node_id = node_id.clone();
            event.sql_text = statement.text.clone();
        }

        let bound = bind_parameters(&adapt_statement(&statement.text), bindings);
        let started = Instant::now();

        if starts_with_ci(bound.trim(), "SELECT") || starts_with_ci(bound.trim(), "WITH") {
            match run_query(&conn, &bound) {
                Ok((columns, rows, total)) => {
                    let duration = started.elapsed().as_millis() as u64;
                    let event = trace.push(EventType::Resultset);
                    event.node_id = node_id.clone();
                    event.sql_text = bound;
                    event.columns = Some(columns);
                    event.rows = Some(rows);
                    event.row_count = Some(total);
                    event.duration_ms = duration;
                }
                Err(e) => push_engine_error(&mut trace, node_id.clone(), &bound, &e, started),
            }
        } else {
            match conn.execute(&bound, []) {
                Ok(affected) => {
                    let duration = started.elapsed().as_millis() as u64;
                    let event = trace.push(EventType::Dml);
                    event.node_id = node_id.clone();
                    event.sql_text = bound;
                    event.row_count = Some(affected as i64);
                    event.duration_ms = duration;
                }
                Err(e) => push_engine_error(&mut trace, node_id.clone(), &bound, &e, started),
            }
        }
    }

    let metadata = build_metadata(&conn, &tables_created, seed_report.total_rows);

    let note = if cancelled {
        "sandbox run cancelled"
    } else {
        "sandbox run complete"
    };
    let events = trace.complete(note);
    let mut result = RunResult::from_trace("sqlite", events, executed_nodes, executed_edges);
    result.sqlite_metadata = Some(metadata);
    if cancelled {
        result.summary.had_error = false;
        result.summary.error_message = None;
    }
    result
}

fn push_engine_error(
    trace: &mut TraceBuilder,
    node_id: Option<String>,
    sql: &str,
    error: &rusqlite::Error,
    started: Instant,
) {
    let number = match error {
        rusqlite::Error::SqliteFailure(e, _) => e.extended_code,
        _ => -1,
    };
    let duration = started.elapsed().as_millis() as u64;
    let event = trace.push(EventType::Error);
    event.node_id = node_id;
    event.sql_text = sql.to_string();
    event.error_number = Some(number);
    event.error_message = Some(error.to_string());
    event.duration_ms = duration;
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("0x{}", b.iter().map(|x| format!("{:02x}", x)).collect::<String>()),
    }
}

/// Execute a query, returning (columns, preview rows, total row count).
fn run_query(
    conn: &Connection,
    sql: &str,
) -> rusqlite::Result<(Vec<String>, Vec<Vec<String>>, i64)> {
    let mut statement = conn.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    let column_count = columns.len();

    let mut rows = statement.query([])?;
    let mut preview: Vec<Vec<String>> = Vec::new();
    let mut total: i64 = 0;
    while let Some(row) = rows.next()? {
        if preview.len() < MAX_PREVIEW_ROWS {
            let mut rendered = Vec::with_capacity(column_count);
            for i in 0..column_count {
                rendered.push(value_to_string(row.get_ref(i)?));
            }
            preview.push(rendered);
        }
        total += 1;
    }

    Ok((columns, preview, total))
}

fn build_metadata(
    conn: &Connection,
    tables_created: &[String],
    total_rows_generated: i64,
) -> SqliteMetadata {
    let mut data_preview = std::collections::BTreeMap::new();

    for table in tables_created {
        let sql = format!("SELECT * FROM {} LIMIT {}", table, TABLE_PREVIEW_ROWS);
        if let Ok((columns, sample_rows, _)) = run_query(conn, &sql) {
            let row_count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .unwrap_or(0);
            data_preview.insert(
                table.clone(),
                TablePreview {
                    columns,
                    sample_rows,
                    row_count,
                },
            );
        }
    }

    SqliteMetadata {
        data_preview,
        tables_created: tables_created.to_vec(),
        total_rows_generated,
    }
}
