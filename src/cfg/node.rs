//! CFG node, edge and graph container types.
//!
//! Nodes live in an arena (a plain `Vec`) and refer to each other through
//! opaque string ids (`N0`, `N1`, …), never through owning references, so
//! loop-back edges and other cycles are trivially representable and the
//! graph clones freely.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ProcSimError;

/// Closed set of node categories. Per-kind behaviour throughout the crate is
/// a match on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Start,
    End,
    Statement,
    Branch,
    Loop,
    Dml,
    Select,
    Call,
    TryCatch,
    CatchBlock,
    Transaction,
    DynamicSql,
    Block,
}

/// A directed edge to another node, optionally labelled with the condition
/// under which it is taken (`"TRUE"`, `"FALSE"`, `"done"`, `"loop back"`,
/// `"success"`, `"error"`, `"handled"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfgEdge {
    pub target_node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl CfgEdge {
    pub fn to(target: &str) -> Self {
        CfgEdge {
            target_node_id: target.to_string(),
            condition: None,
        }
    }

    pub fn to_if(target: &str, condition: &str) -> Self {
        CfgEdge {
            target_node_id: target.to_string(),
            condition: Some(condition.to_string()),
        }
    }
}

/// A single CFG node. Immutable once the builder finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfgNode {
    pub id: String,
    pub kind: NodeKind,
    /// Short display label (builder truncates at ~50 chars)
    pub label: String,
    /// Verbatim source snippet, whitespace-trimmed. Empty for synthetic nodes.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub sql_snippet: String,
    pub start_line: u64,
    pub end_line: u64,
    pub edges: Vec<CfgEdge>,
}

/// The control flow graph of one procedure body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFlowGraph {
    pub start_node_id: String,
    pub end_node_id: String,
    pub nodes: Vec<CfgNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ControlFlowGraph {
    pub(crate) fn new(start_node_id: String, end_node_id: String, nodes: Vec<CfgNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        ControlFlowGraph {
            start_node_id,
            end_node_id,
            nodes,
            index,
        }
    }

    /// Rebuild the id lookup (needed after deserialization, where the
    /// index is skipped).
    pub fn reindex(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
    }

    pub fn node(&self, id: &str) -> Option<&CfgNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn start_node(&self) -> Option<&CfgNode> {
        self.node(&self.start_node_id)
    }

    /// Whether the graph contains an edge `source -> target`.
    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.node(source)
            .map(|n| n.edges.iter().any(|e| e.target_node_id == target))
            .unwrap_or(false)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Check the structural invariants that must hold after every build:
    /// edge targets resolve, exactly one Start and one End, Start has an
    /// outgoing edge, End has none, and every other node has at least one.
    pub fn validate(&self) -> Result<(), ProcSimError> {
        for node in &self.nodes {
            for edge in &node.edges {
                if !self.index.contains_key(&edge.target_node_id) {
                    return Err(ProcSimError::internal(format!(
                        "edge {} -> {} targets a node not in the graph",
                        node.id, edge.target_node_id
                    )));
                }
            }
        }

        let starts = self.nodes_of_kind(NodeKind::Start).count();
        let ends = self.nodes_of_kind(NodeKind::End).count();
        if starts != 1 || ends != 1 {
            return Err(ProcSimError::internal(format!(
                "expected exactly one Start and one End node, found {} and {}",
                starts, ends
            )));
        }

        for node in &self.nodes {
            match node.kind {
                NodeKind::End => {
                    if !node.edges.is_empty() {
                        return Err(ProcSimError::internal(format!(
                            "End node {} has outgoing edges",
                            node.id
                        )));
                    }
                }
                NodeKind::Branch => {
                    if node.edges.len() != 2 {
                        return Err(ProcSimError::internal(format!(
                            "Branch node {} has {} edges, expected 2",
                            node.id,
                            node.edges.len()
                        )));
                    }
                }
                _ => {
                    if node.edges.is_empty() {
                        return Err(ProcSimError::internal(format!(
                            "node {} ({:?}) has no outgoing edge",
                            node.id, node.kind
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
