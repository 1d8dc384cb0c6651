//! Lowering of the body AST into a control flow graph.
//!
//! A recursive descent over `ProcStatement`s threads a current-tail node:
//! each statement handler attaches its entry node to the tail it is given
//! and returns the node the next statement must attach to. Control
//! constructs synthesize their merge/exit nodes here:
//!
//! - `IF` produces a Branch node with `TRUE`/`FALSE` edges into cosmetic
//!   then/else Block nodes and a single `(merge)` confluence node.
//! - `WHILE` produces a Loop node whose body tail re-enters it with a
//!   `"loop back"` edge, plus a `"done"` edge to a loop-exit node.
//! - `BEGIN TRY`/`BEGIN CATCH` produces a TryCatch node with an `"error"`
//!   edge to a CatchBlock node; both tails meet at a merge node via
//!   `"success"` and `"handled"` edges.
//!
//! A `RETURN` terminates its scope: its node connects straight to End and
//! the rest of the scope is unreachable (and not lowered).
//!
//! Node ids (`N0`, `N1`, …) come from a counter scoped to one build call.

use std::collections::HashMap;

use tracing::debug;

use crate::parser::{LeafKind, ProcStatement};
use crate::util::{normalize_ws, truncate_label};

use super::node::{CfgEdge, CfgNode, ControlFlowGraph, NodeKind};

const LABEL_MAX: usize = 50;

/// Build a CFG from parsed body statements.
pub fn build_cfg(statements: &[ProcStatement]) -> ControlFlowGraph {
    let mut builder = Builder::default();

    let start = builder.node(NodeKind::Start, "start", "", 0, 0);
    let end = builder.node(NodeKind::End, "end", "", 0, 0);

    let tail = builder.lower_all(statements, start.clone(), &end);
    if let Some(tail) = tail {
        if tail != end && !builder.has_edge(&tail, &end) {
            builder.edge(&tail, &end, None);
        }
    }

    debug!(nodes = builder.nodes.len(), "built control flow graph");
    ControlFlowGraph::new(start, end, builder.nodes)
}

#[derive(Default)]
struct Builder {
    nodes: Vec<CfgNode>,
    index: HashMap<String, usize>,
    counter: usize,
}

impl Builder {
    fn node(
        &mut self,
        kind: NodeKind,
        label: &str,
        sql_snippet: &str,
        start_line: u64,
        end_line: u64,
    ) -> String {
        let id = format!("N{}", self.counter);
        self.counter += 1;
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(CfgNode {
            id: id.clone(),
            kind,
            label: truncate_label(label, LABEL_MAX),
            sql_snippet: sql_snippet.to_string(),
            start_line,
            end_line,
            edges: Vec::new(),
        });
        id
    }

    fn edge(&mut self, from: &str, to: &str, condition: Option<&str>) {
        let idx = self.index[from];
        let edge = match condition {
            Some(c) => CfgEdge::to_if(to, c),
            None => CfgEdge::to(to),
        };
        self.nodes[idx].edges.push(edge);
    }

    fn has_edge(&self, from: &str, to: &str) -> bool {
        self.index
            .get(from)
            .map(|&i| self.nodes[i].edges.iter().any(|e| e.target_node_id == to))
            .unwrap_or(false)
    }

    /// Lower a statement list from `tail`; returns the new tail, or `None`
    /// when the list terminated the procedure (RETURN).
    fn lower_all(
        &mut self,
        statements: &[ProcStatement],
        tail: String,
        end: &str,
    ) -> Option<String> {
        let mut current = tail;
        for statement in statements {
            match self.lower_statement(statement, current, end) {
                Some(next) => current = next,
                None => return None,
            }
        }
        Some(current)
    }

    fn lower_statement(
        &mut self,
        statement: &ProcStatement,
        tail: String,
        end: &str,
    ) -> Option<String> {
        match statement {
            ProcStatement::Leaf {
                kind,
                sql,
                start_line,
                end_line,
            } => {
                let node_kind = leaf_node_kind(*kind);
                let label = normalize_ws(sql);
                let node = self.node(node_kind, &label, sql, *start_line, *end_line);
                self.edge(&tail, &node, None);

                if *kind == LeafKind::Return {
                    self.edge(&node, end, None);
                    return None;
                }
                Some(node)
            }

            ProcStatement::Block { body, .. } => self.lower_all(body, tail, end),

            ProcStatement::If {
                condition,
                then_branch,
                else_branch,
                start_line,
                end_line,
            } => {
                let label = format!("IF {}", normalize_ws(condition));
                let branch = self.node(NodeKind::Branch, &label, condition, *start_line, *end_line);
                self.edge(&tail, &branch, None);

                let merge = self.node(NodeKind::Statement, "(merge)", "", *end_line, *end_line);

                let then_block =
                    self.node(NodeKind::Block, "then", "", *start_line, *start_line);
                self.edge(&branch, &then_block, Some("TRUE"));
                if let Some(then_tail) = self.lower_all(then_branch, then_block, end) {
                    self.edge(&then_tail, &merge, None);
                }

                match else_branch {
                    Some(else_statements) => {
                        let else_block =
                            self.node(NodeKind::Block, "else", "", *start_line, *start_line);
                        self.edge(&branch, &else_block, Some("FALSE"));
                        if let Some(else_tail) = self.lower_all(else_statements, else_block, end) {
                            self.edge(&else_tail, &merge, None);
                        }
                    }
                    None => {
                        self.edge(&branch, &merge, Some("FALSE"));
                    }
                }

                Some(merge)
            }

            ProcStatement::While {
                condition,
                body,
                start_line,
                end_line,
            } => {
                let label = format!("WHILE {}", normalize_ws(condition));
                let loop_node =
                    self.node(NodeKind::Loop, &label, condition, *start_line, *end_line);
                self.edge(&tail, &loop_node, None);

                let exit = self.node(
                    NodeKind::Statement,
                    "(loop exit)",
                    "",
                    *end_line,
                    *end_line,
                );

                // Loop nodes always carry an unconditioned body-entry edge;
                // an empty body aims it at the exit, like the ELSE-less IF
                // aims its FALSE edge at the merge
                match self.lower_all(body, loop_node.clone(), end) {
                    Some(body_tail) if body_tail != loop_node => {
                        self.edge(&body_tail, &loop_node, Some("loop back"));
                    }
                    Some(_) => {
                        self.edge(&loop_node, &exit, None);
                    }
                    None => {}
                }
                self.edge(&loop_node, &exit, Some("done"));

                Some(exit)
            }

            ProcStatement::TryCatch {
                try_body,
                catch_body,
                start_line,
                end_line,
            } => {
                let try_node = self.node(NodeKind::TryCatch, "TRY", "", *start_line, *end_line);
                self.edge(&tail, &try_node, None);

                let merge = self.node(NodeKind::Statement, "(merge)", "", *end_line, *end_line);

                if let Some(try_tail) = self.lower_all(try_body, try_node.clone(), end) {
                    self.edge(&try_tail, &merge, Some("success"));
                }

                let catch_node =
                    self.node(NodeKind::CatchBlock, "CATCH", "", *start_line, *end_line);
                self.edge(&try_node, &catch_node, Some("error"));
                if let Some(catch_tail) = self.lower_all(catch_body, catch_node.clone(), end) {
                    self.edge(&catch_tail, &merge, Some("handled"));
                }

                Some(merge)
            }
        }
    }
}

/// Closed mapping from leaf statement kinds to CFG node kinds.
fn leaf_node_kind(kind: LeafKind) -> NodeKind {
    match kind {
        LeafKind::Select => NodeKind::Select,
        LeafKind::Insert | LeafKind::Update | LeafKind::Delete | LeafKind::Merge => NodeKind::Dml,
        LeafKind::Exec => NodeKind::Call,
        LeafKind::DynamicSql => NodeKind::DynamicSql,
        LeafKind::Transaction => NodeKind::Transaction,
        LeafKind::Declare
        | LeafKind::Set
        | LeafKind::Return
        | LeafKind::Print
        | LeafKind::Raiserror
        | LeafKind::Other => NodeKind::Statement,
    }
}
