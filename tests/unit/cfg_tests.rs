//! CFG construction tests: structural invariants over built graphs

use procsim::{parse, NodeKind};

fn cfg(sql: &str) -> procsim::ControlFlowGraph {
    let parsed = parse(sql).unwrap();
    parsed.cfg.validate().unwrap();
    parsed.cfg
}

// ============================================================================
// Structural invariants
// ============================================================================

#[test]
fn test_exactly_one_start_and_end() {
    let graph = cfg("SELECT 1;\nIF @x = 1 SELECT 2\nWHILE @i < 3 SET @i = @i + 1");
    assert_eq!(graph.nodes_of_kind(NodeKind::Start).count(), 1);
    assert_eq!(graph.nodes_of_kind(NodeKind::End).count(), 1);
}

#[test]
fn test_end_has_no_outgoing_edges() {
    let graph = cfg("SELECT 1;");
    let end = graph.node(&graph.end_node_id).unwrap();
    assert!(end.edges.is_empty());
}

#[test]
fn test_every_other_node_has_an_outgoing_edge() {
    let graph = cfg(
        "IF @X > 0 BEGIN SELECT 1; END ELSE BEGIN SELECT 2; END\nWHILE @I < 5 BEGIN UPDATE T SET C = 1; END\nSELECT 'done';",
    );
    for node in &graph.nodes {
        if node.kind != NodeKind::End {
            assert!(
                !node.edges.is_empty(),
                "node {} ({:?}) has no outgoing edge",
                node.id,
                node.kind
            );
        }
    }
}

#[test]
fn test_all_edges_resolve() {
    let graph = cfg("BEGIN TRY UPDATE T SET A = 1; END TRY BEGIN CATCH SELECT 1; END CATCH");
    for node in &graph.nodes {
        for edge in &node.edges {
            assert!(
                graph.node(&edge.target_node_id).is_some(),
                "edge {} -> {} dangles",
                node.id,
                edge.target_node_id
            );
        }
    }
}

// ============================================================================
// Branch shape
// ============================================================================

#[test]
fn test_branch_has_true_and_false_edges() {
    let graph = cfg("IF @X > 0 BEGIN SELECT 'positive'; END ELSE BEGIN SELECT 'negative'; END");
    let branches: Vec<_> = graph.nodes_of_kind(NodeKind::Branch).collect();
    assert_eq!(branches.len(), 1);
    let branch = branches[0];
    assert_eq!(branch.edges.len(), 2);
    assert!(branch
        .edges
        .iter()
        .any(|e| e.condition.as_deref() == Some("TRUE")));
    assert!(branch
        .edges
        .iter()
        .any(|e| e.condition.as_deref() == Some("FALSE")));
}

#[test]
fn test_both_arms_reach_one_merge() {
    let graph = cfg("IF @X > 0 BEGIN SELECT 1; END ELSE BEGIN SELECT 2; END\nSELECT 3;");
    let selects: Vec<_> = graph.nodes_of_kind(NodeKind::Select).collect();
    // The arm selects both point at the same merge node
    let arm_targets: Vec<&str> = selects
        .iter()
        .filter(|n| n.sql_snippet != "SELECT 3")
        .map(|n| n.edges[0].target_node_id.as_str())
        .collect();
    assert_eq!(arm_targets.len(), 2);
    assert_eq!(arm_targets[0], arm_targets[1]);
    let merge = graph.node(arm_targets[0]).unwrap();
    assert_eq!(merge.kind, NodeKind::Statement);
    assert_eq!(merge.label, "(merge)");
}

#[test]
fn test_nested_if() {
    let graph = cfg(
        "IF @A > 0 BEGIN IF @B > 0 BEGIN SELECT 'both'; END END ELSE BEGIN SELECT 'neither'; END",
    );
    assert_eq!(graph.nodes_of_kind(NodeKind::Branch).count(), 2);
    graph.validate().unwrap();
}

// ============================================================================
// Loop shape
// ============================================================================

#[test]
fn test_loop_done_and_loop_back_edges() {
    let graph = cfg("WHILE @I < 10 BEGIN SET @I = @I + 1; END");
    let loops: Vec<_> = graph.nodes_of_kind(NodeKind::Loop).collect();
    assert_eq!(loops.len(), 1);
    let loop_node = loops[0];

    assert!(loop_node
        .edges
        .iter()
        .any(|e| e.condition.as_deref() == Some("done")));

    let loop_back_count = graph
        .nodes
        .iter()
        .flat_map(|n| &n.edges)
        .filter(|e| e.condition.as_deref() == Some("loop back"))
        .count();
    assert_eq!(loop_back_count, 1);
}

// ============================================================================
// Try/catch shape
// ============================================================================

#[test]
fn test_try_catch_error_edge_and_merge() {
    let graph =
        cfg("BEGIN TRY SELECT 1; END TRY BEGIN CATCH SELECT ERROR_MESSAGE(); END CATCH");

    let try_node = graph.nodes_of_kind(NodeKind::TryCatch).next().unwrap();
    let catch_node = graph.nodes_of_kind(NodeKind::CatchBlock).next().unwrap();

    let error_edge = try_node
        .edges
        .iter()
        .find(|e| e.condition.as_deref() == Some("error"))
        .expect("try node must have an error edge");
    assert_eq!(error_edge.target_node_id, catch_node.id);

    let success: Vec<_> = graph
        .nodes
        .iter()
        .flat_map(|n| &n.edges)
        .filter(|e| e.condition.as_deref() == Some("success"))
        .collect();
    let handled: Vec<_> = graph
        .nodes
        .iter()
        .flat_map(|n| &n.edges)
        .filter(|e| e.condition.as_deref() == Some("handled"))
        .collect();
    assert_eq!(success.len(), 1);
    assert_eq!(handled.len(), 1);
    assert_eq!(success[0].target_node_id, handled[0].target_node_id);
}

// ============================================================================
// Kind mapping
// ============================================================================

#[test]
fn test_statement_kind_mapping() {
    let graph = cfg(
        "DECLARE @x INT;\nSELECT 1;\nINSERT INTO T (A) VALUES (1);\nEXEC dbo.Other;\nEXEC sp_executesql @stmt;\nBEGIN TRAN\nCOMMIT TRAN",
    );
    assert_eq!(graph.nodes_of_kind(NodeKind::Select).count(), 1);
    assert_eq!(graph.nodes_of_kind(NodeKind::Dml).count(), 1);
    assert_eq!(graph.nodes_of_kind(NodeKind::Call).count(), 1);
    assert_eq!(graph.nodes_of_kind(NodeKind::DynamicSql).count(), 1);
    assert_eq!(graph.nodes_of_kind(NodeKind::Transaction).count(), 2);
}

#[test]
fn test_node_ids_stable_within_one_graph() {
    let graph = cfg("SELECT 1;\nSELECT 2;");
    let mut seen = std::collections::HashSet::new();
    for node in &graph.nodes {
        assert!(seen.insert(node.id.clone()), "duplicate id {}", node.id);
        assert!(node.id.starts_with('N'));
    }
}
