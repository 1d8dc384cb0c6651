//! Dry-run walker: CFG traversal with static branch prediction.
//!
//! Depth-first from the start node. Branch outcomes come from the predicate
//! evaluator; a predictable branch follows only its matching edge and marks
//! it executed, an unpredictable branch walks both arms without marking
//! either. Loops simulate exactly one iteration. No database is touched.
//!
//! A per-walk visited set means each node is visited at most once, so the
//! walk is O(|V| + |E|) regardless of graph shape; recursion is additionally
//! capped to tolerate pathological inputs.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::cfg::{CfgNode, ControlFlowGraph, NodeKind};
use crate::params::ParamBindings;
use crate::predicate;
use crate::trace::{edge_key, EventType, RunResult, TraceBuilder};

/// Maximum recursion depth for a single walk.
pub const MAX_WALK_DEPTH: usize = 100;

/// Run the dry-run simulation over a CFG with the given bindings.
pub fn dry_run(cfg: &ControlFlowGraph, bindings: &ParamBindings) -> RunResult {
    let mut walker = Walker {
        cfg,
        bindings,
        trace: TraceBuilder::start("dry run"),
        visited: HashSet::new(),
        executed_nodes: BTreeSet::new(),
        executed_edges: BTreeSet::new(),
        internal_fault: false,
    };

    walker.walk(&cfg.start_node_id, 0);

    let Walker {
        trace,
        executed_nodes,
        executed_edges,
        internal_fault,
        ..
    } = walker;

    let note = if internal_fault {
        "dry run aborted on internal fault"
    } else {
        "dry run complete"
    };
    let events = trace.complete(note);
    RunResult::from_trace("dryrun", events, executed_nodes, executed_edges)
}

struct Walker<'a> {
    cfg: &'a ControlFlowGraph,
    bindings: &'a ParamBindings,
    trace: TraceBuilder,
    visited: HashSet<String>,
    executed_nodes: BTreeSet<String>,
    executed_edges: BTreeSet<String>,
    internal_fault: bool,
}

impl Walker<'_> {
    fn walk(&mut self, node_id: &str, depth: usize) {
        if depth > MAX_WALK_DEPTH || self.internal_fault {
            return;
        }
        if !self.visited.insert(node_id.to_string()) {
            return;
        }

        let Some(node) = self.cfg.node(node_id) else {
            // A dangling edge is a builder invariant violation: record a
            // diagnostic and stop rather than walking on silently.
            warn!(node_id, "walk reached a node id not present in the graph");
            let event = self.trace.push(EventType::Error);
            event.error_message = Some(format!(
                "internal: edge target {} not present in the graph",
                node_id
            ));
            self.internal_fault = true;
            return;
        };

        self.executed_nodes.insert(node.id.clone());
        debug!(node_id = %node.id, kind = ?node.kind, "visit");

        match node.kind {
            NodeKind::Start | NodeKind::End | NodeKind::Block | NodeKind::Statement => {
                self.follow_all(node, depth);
            }
            NodeKind::Branch => self.walk_branch(node, depth),
            NodeKind::Loop => self.walk_loop(node, depth),
            _ => {
                let event = self.trace.push(EventType::Simulated);
                event.node_id = Some(node.id.clone());
                event.sql_text = node.sql_snippet.clone();
                event.row_count = Some(0);
                self.follow_all(node, depth);
            }
        }
    }

    /// Follow every out-edge; a single out-edge is a determinate choice and
    /// is recorded as executed, multiple out-edges are not.
    fn follow_all(&mut self, node: &CfgNode, depth: usize) {
        let determinate = node.edges.len() == 1;
        let edges: Vec<String> = node.edges.iter().map(|e| e.target_node_id.clone()).collect();
        for target in edges {
            if determinate {
                self.executed_edges.insert(edge_key(&node.id, &target));
            }
            self.walk(&target, depth + 1);
        }
    }

    fn walk_branch(&mut self, node: &CfgNode, depth: usize) {
        let verdict = predicate::evaluate(&node.sql_snippet, self.bindings);

        let taken = match verdict {
            Some(true) => "TRUE (predicted)",
            Some(false) => "FALSE (predicted)",
            None => "UNPREDICTABLE",
        };
        let event = self.trace.push(EventType::Branch);
        event.node_id = Some(node.id.clone());
        event.sql_text = node.sql_snippet.clone();
        event.branch_taken = Some(taken.to_string());

        match verdict {
            Some(value) => {
                let wanted = if value { "TRUE" } else { "FALSE" };
                let target = node
                    .edges
                    .iter()
                    .find(|e| e.condition.as_deref() == Some(wanted))
                    .map(|e| e.target_node_id.clone());
                if let Some(target) = target {
                    self.executed_edges.insert(edge_key(&node.id, &target));
                    self.walk(&target, depth + 1);
                }
            }
            None => {
                let targets: Vec<String> =
                    node.edges.iter().map(|e| e.target_node_id.clone()).collect();
                for target in targets {
                    self.walk(&target, depth + 1);
                }
            }
        }
    }

    fn walk_loop(&mut self, node: &CfgNode, depth: usize) {
        // Body edge once, then the exit edge; the body tail's loop-back edge
        // is cut off by the visited set.
        let body = node
            .edges
            .iter()
            .find(|e| e.condition.is_none())
            .map(|e| e.target_node_id.clone());
        let done = node
            .edges
            .iter()
            .find(|e| e.condition.as_deref() == Some("done"))
            .map(|e| e.target_node_id.clone());

        // The event must match what the walk does with the body edge
        let event = self.trace.push(EventType::Simulated);
        event.node_id = Some(node.id.clone());
        event.sql_text = if body.is_some() {
            "simulated — 1 iteration".to_string()
        } else {
            "simulated — loop body not entered".to_string()
        };

        if let Some(target) = body {
            self.executed_edges.insert(edge_key(&node.id, &target));
            self.walk(&target, depth + 1);
        }
        if let Some(target) = done {
            self.executed_edges.insert(edge_key(&node.id, &target));
            self.walk(&target, depth + 1);
        }
    }
}
