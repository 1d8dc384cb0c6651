//! Live rollback executor: runs a procedure body against a real SQL Server
//! inside a transaction that is always rolled back.
//!
//! Each on-branch statement is sent as its own batch, prefixed with a
//! DECLARE prologue that binds the procedure parameters, so parameter
//! references resolve in every batch. The session transaction opened with
//! `BEGIN TRAN` spans all batches and is rolled back on every exit path:
//! normal completion, first engine error, statement timeout, and
//! cancellation.
//!
//! Procedures targeting the system databases are refused up front.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tiberius::{AuthMethod, Client, ColumnData, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cfg::ControlFlowGraph;
use crate::error::ProcSimError;
use crate::params::{ParamBindings, ParamValue, ProcParameter};
use crate::sandbox::{
    correlate_node, extract_body, on_branch, select_branch, split_statements,
};
use crate::trace::{EventType, RunResult, TraceBuilder, MAX_PREVIEW_ROWS};
use crate::util::starts_with_ci;

/// Per-statement execution timeout.
pub const STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_DATABASES: &[&str] = &["master", "msdb", "model", "tempdb"];

type SqlClient = Client<Compat<TcpStream>>;

/// Connection settings for a live run.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub trust_cert: bool,
}

impl LiveConfig {
    fn to_tiberius(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.database(&self.database);
        config.authentication(AuthMethod::sql_server(&self.username, &self.password));
        if self.trust_cert {
            config.trust_cert();
        }
        config
    }
}

/// Execute the procedure against SQL Server, always rolling back.
///
/// Errors are returned only when the input is refused (`BadInput`) or the
/// engine is unreachable; per-statement failures become `error` trace
/// events and terminate the run after rollback.
pub async fn live_run(
    cfg: &ControlFlowGraph,
    procedure_text: &str,
    params: &[ProcParameter],
    bindings: &ParamBindings,
    config: &LiveConfig,
    cancel: &CancellationToken,
) -> Result<RunResult, ProcSimError> {
    if SYSTEM_DATABASES
        .iter()
        .any(|db| config.database.eq_ignore_ascii_case(db))
    {
        return Err(ProcSimError::bad_input(format!(
            "refusing to run against system database '{}'",
            config.database
        )));
    }

    let tiberius_config = config.to_tiberius();
    let tcp = TcpStream::connect(tiberius_config.get_addr())
        .await
        .map_err(|e| ProcSimError::Engine {
            number: -1,
            message: format!("could not reach {}:{}: {}", config.host, config.port, e),
        })?;
    tcp.set_nodelay(true).map_err(|e| ProcSimError::Engine {
        number: -1,
        message: e.to_string(),
    })?;
    let mut client = Client::connect(tiberius_config, tcp.compat_write())
        .await
        .map_err(|e| ProcSimError::Engine {
            number: -1,
            message: e.to_string(),
        })?;

    let mut trace = TraceBuilder::start("live rollback run");
    let mut executed_nodes: BTreeSet<String> = BTreeSet::new();
    let executed_edges: BTreeSet<String> = BTreeSet::new();

    let body = extract_body(procedure_text);
    let statements = split_statements(body);
    let choice = select_branch(body, bindings);
    let prologue = declare_prologue(params, bindings);
    debug!(?choice, statements = statements.len(), "live plan");

    let mut cancelled = false;

    match client.simple_query("BEGIN TRAN").await {
        Ok(stream) => {
            let _ = stream.into_results().await;
            let event = trace.push(EventType::Txn);
            event.sql_text = "BEGIN TRAN".to_string();
        }
        Err(e) => {
            push_engine_error(&mut trace, None, "BEGIN TRAN", &e);
        }
    }

    let began = trace
        .events()
        .iter()
        .any(|e| e.event_type == EventType::Txn);

    if began {
        for statement in &statements {
            if !on_branch(statement.arm, choice) {
                let event = trace.push(EventType::ControlFlow);
                event.sql_text = format!(
                    "Skipped (branch not taken): {}",
                    crate::util::truncate_label(&crate::util::normalize_ws(&statement.text), 60)
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

            let batch = format!("{}{}", prologue, statement.text);
            let started = Instant::now();
            let is_query = starts_with_ci(statement.text.trim(), "SELECT")
                || starts_with_ci(statement.text.trim(), "WITH");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                result = tokio::time::timeout(
                    STATEMENT_TIMEOUT,
                    run_batch(&mut client, &batch, is_query),
                ) => result,
            };

            match outcome {
                Err(_) => {
                    let event = trace.push(EventType::Error);
                    event.node_id = node_id;
                    event.sql_text = statement.text.clone();
                    event.error_message = Some(format!(
                        "statement timed out after {}s",
                        STATEMENT_TIMEOUT.as_secs()
                    ));
                    break;
                }
                Ok(Err(e)) => {
                    push_engine_error(&mut trace, node_id, &statement.text, &e);
                    break;
                }
                Ok(Ok(BatchOutcome::Rows { columns, rows, total })) => {
                    let event = trace.push(EventType::Resultset);
                    event.node_id = node_id;
                    event.sql_text = statement.text.clone();
                    event.columns = Some(columns);
                    event.rows = Some(rows);
                    event.row_count = Some(total);
                    event.duration_ms = started.elapsed().as_millis() as u64;
                }
                Ok(Ok(BatchOutcome::Affected(n))) => {
                    let event = trace.push(EventType::Dml);
                    event.node_id = node_id;
                    event.sql_text = statement.text.clone();
                    event.row_count = Some(n as i64);
                    event.duration_ms = started.elapsed().as_millis() as u64;
                }
            }
        }
    }

    // Rollback on every path, including cancellation and timeout
    match client
        .simple_query("IF @@TRANCOUNT > 0 ROLLBACK TRAN")
        .await
    {
        Ok(stream) => {
            let _ = stream.into_results().await;
            let event = trace.push(EventType::Txn);
            event.sql_text = "ROLLBACK TRAN".to_string();
        }
        Err(e) => {
            warn!(error = %e, "rollback failed");
            push_engine_error(&mut trace, None, "ROLLBACK TRAN", &e);
        }
    }

    let note = if cancelled {
        "live run cancelled (rolled back)"
    } else {
        "live run complete (rolled back)"
    };
    let events = trace.complete(note);
    let mut result = RunResult::from_trace("live", events, executed_nodes, executed_edges);
    if cancelled {
        result.summary.had_error = false;
        result.summary.error_message = None;
    }
    Ok(result)
}

/// DECLARE-and-bind prologue prepended to every batch so parameter
/// references resolve per batch.
fn declare_prologue(params: &[ProcParameter], bindings: &ParamBindings) -> String {
    let mut prologue = String::new();
    for param in params {
        let literal = bindings
            .get(&param.name)
            .map(ParamValue::to_sql_literal)
            .or_else(|| param.default_value.clone())
            .unwrap_or_else(|| "NULL".to_string());
        prologue.push_str(&format!(
            "DECLARE {} {} = {};\n",
            param.name, param.sql_type, literal
        ));
    }
    prologue
}

enum BatchOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        total: i64,
    },
    Affected(u64),
}

async fn run_batch(
    client: &mut SqlClient,
    batch: &str,
    is_query: bool,
) -> Result<BatchOutcome, tiberius::error::Error> {
    if is_query {
        let stream = client.simple_query(batch).await?;
        let results = stream.into_results().await?;
        // The DECLARE prologue yields no result sets; the statement's own
        // set is the last one
        let rows = results.into_iter().last().unwrap_or_default();

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let total = rows.len() as i64;
        let preview: Vec<Vec<String>> = rows
            .iter()
            .take(MAX_PREVIEW_ROWS)
            .map(|row| row.cells().map(|(_, data)| cell_to_string(data)).collect())
            .collect();

        Ok(BatchOutcome::Rows {
            columns,
            rows: preview,
            total,
        })
    } else {
        let result = client.execute(batch, &[]).await?;
        Ok(BatchOutcome::Affected(result.total()))
    }
}

fn push_engine_error(
    trace: &mut TraceBuilder,
    node_id: Option<String>,
    sql: &str,
    error: &tiberius::error::Error,
) {
    let number = match error {
        tiberius::error::Error::Server(token) => token.code() as i32,
        _ => -1,
    };
    let event = trace.push(EventType::Error);
    event.node_id = node_id;
    event.sql_text = sql.to_string();
    event.error_number = Some(number);
    event.error_message = Some(error.to_string());
}

fn cell_to_string(data: &ColumnData<'_>) -> String {
    match data {
        ColumnData::U8(v) => render_opt(v.as_ref()),
        ColumnData::I16(v) => render_opt(v.as_ref()),
        ColumnData::I32(v) => render_opt(v.as_ref()),
        ColumnData::I64(v) => render_opt(v.as_ref()),
        ColumnData::F32(v) => render_opt(v.as_ref()),
        ColumnData::F64(v) => render_opt(v.as_ref()),
        ColumnData::Bit(v) => render_opt(v.as_ref()),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "NULL".to_string()),
        ColumnData::Guid(v) => render_opt(v.as_ref()),
        other => format!("{:?}", other),
    }
}

fn render_opt<T: ToString>(value: Option<&T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "NULL".to_string())
}
