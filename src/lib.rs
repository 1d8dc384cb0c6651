//! procsim: control-flow analysis and simulated execution for T-SQL
//! stored procedures
//!
//! This library parses a stored procedure's text into a control flow graph
//! and drives that graph through three execution engines: a dry-run
//! simulator that predicts branches from parameter bindings, a SQLite
//! sandbox that executes an adapted T-SQL subset against an inferred,
//! seeded schema, and a live executor that runs against SQL Server inside
//! a transaction that is always rolled back.

pub mod cfg;
pub mod error;
pub mod live;
pub mod params;
pub mod parser;
pub mod predicate;
pub mod sandbox;
pub mod trace;
pub mod util;

mod dryrun;

use std::path::Path;

use anyhow::{Context, Result};

pub use cfg::{CfgEdge, CfgNode, ControlFlowGraph, NodeKind};
pub use dryrun::{dry_run, MAX_WALK_DEPTH};
pub use error::ProcSimError;
pub use params::{ParamBindings, ParamValue, ProcParameter};
pub use sandbox::{sandbox_run, sandbox_run_with_cancel};
pub use trace::{RunResult, RunSummary, TraceEvent};

use serde::Serialize;

/// A parsed procedure: its CFG and declared parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedProcedure {
    /// Schema-qualified procedure name; `None` in batch mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cfg: ControlFlowGraph,
    pub params: Vec<ProcParameter>,
}

/// Parse procedure text into a CFG and parameter list.
///
/// Accepts either a `CREATE/ALTER PROCEDURE` definition or a bare batch of
/// statements. Fails with `BadInput` on unparseable text; the returned
/// graph always satisfies the structural invariants.
pub fn parse(procedure_text: &str) -> std::result::Result<ParsedProcedure, ProcSimError> {
    if procedure_text.trim().is_empty() {
        return Err(ProcSimError::bad_input("procedure text is empty"));
    }

    // Step 1: header + body AST
    let source = parser::parse_source(procedure_text)?;

    // Step 2: lower to a CFG
    let graph = cfg::build_cfg(&source.statements);

    // Step 3: the graph must be well-formed before anyone walks it
    graph.validate()?;

    let (name, params) = match source.header {
        Some(header) => (
            Some(format!("{}.{}", header.schema, header.name)),
            header.parameters,
        ),
        None => (None, Vec::new()),
    };

    Ok(ParsedProcedure {
        name,
        cfg: graph,
        params,
    })
}

/// Parse a procedure from a file on disk.
pub fn parse_file(path: &Path) -> Result<ParsedProcedure> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("failed to parse {}", path.display()))
}
