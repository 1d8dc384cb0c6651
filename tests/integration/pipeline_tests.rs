//! End-to-end pipeline scenarios: parse → dry run / sandbox run

use procsim::trace::EventType;
use procsim::{dry_run, parse, sandbox_run, NodeKind, ParamBindings, ParamValue};

// ============================================================================
// Scenario: linear SELECT procedure
// ============================================================================

#[test]
fn test_linear_select_procedure() {
    let parsed = parse(
        "CREATE PROCEDURE p @Id INT AS BEGIN SELECT * FROM Products WHERE Id = @Id; END",
    )
    .unwrap();

    assert!(parsed.cfg.nodes.len() >= 3);
    assert_eq!(parsed.cfg.nodes_of_kind(NodeKind::Select).count(), 1);

    assert_eq!(parsed.params.len(), 1);
    let param = &parsed.params[0];
    assert_eq!(param.name, "@Id");
    assert_eq!(param.sql_type, "INT");
    assert!(!param.has_default);
    assert!(!param.is_output);
}

// ============================================================================
// Scenario: IF/ELSE with a decidable and an undecidable binding
// ============================================================================

const IF_ELSE_PROC: &str = "CREATE PROCEDURE p @X INT AS BEGIN\nIF @X > 0\nBEGIN\nSELECT 'positive';\nEND\nELSE\nBEGIN\nSELECT 'negative';\nEND\nEND";

#[test]
fn test_if_else_true_arm() {
    let parsed = parse(IF_ELSE_PROC).unwrap();
    let branches: Vec<_> = parsed.cfg.nodes_of_kind(NodeKind::Branch).collect();
    assert_eq!(branches.len(), 1);
    let branch = branches[0];
    assert_eq!(branch.edges.len(), 2);

    let bindings = ParamBindings::new().with("@X", ParamValue::Int(5));
    let result = dry_run(&parsed.cfg, &bindings);

    let branch_event = result
        .trace
        .iter()
        .find(|e| e.event_type == EventType::Branch)
        .unwrap();
    assert_eq!(branch_event.branch_taken.as_deref(), Some("TRUE (predicted)"));

    let true_target = &branch
        .edges
        .iter()
        .find(|e| e.condition.as_deref() == Some("TRUE"))
        .unwrap()
        .target_node_id;
    let false_target = &branch
        .edges
        .iter()
        .find(|e| e.condition.as_deref() == Some("FALSE"))
        .unwrap()
        .target_node_id;

    assert!(result
        .executed_edges
        .contains(&format!("{}->{}", branch.id, true_target)));
    assert!(!result
        .executed_edges
        .contains(&format!("{}->{}", branch.id, false_target)));
}

#[test]
fn test_if_else_unpredictable() {
    let parsed = parse(IF_ELSE_PROC).unwrap();
    let bindings = ParamBindings::new().with("@X", ParamValue::Text("some string".into()));
    let result = dry_run(&parsed.cfg, &bindings);

    let branch_event = result
        .trace
        .iter()
        .find(|e| e.event_type == EventType::Branch)
        .unwrap();
    assert_eq!(branch_event.branch_taken.as_deref(), Some("UNPREDICTABLE"));

    let branch = parsed.cfg.nodes_of_kind(NodeKind::Branch).next().unwrap();
    for edge in &branch.edges {
        assert!(!result
            .executed_edges
            .contains(&format!("{}->{}", branch.id, edge.target_node_id)));
        assert!(result.executed_nodes.contains(&edge.target_node_id));
    }
}

// ============================================================================
// Scenario: WHILE loop
// ============================================================================

#[test]
fn test_while_loop_single_simulated_iteration() {
    let parsed = parse("WHILE @I < 10 BEGIN SET @I = @I + 1; END").unwrap();

    let loops: Vec<_> = parsed.cfg.nodes_of_kind(NodeKind::Loop).collect();
    assert_eq!(loops.len(), 1);
    assert!(loops[0]
        .edges
        .iter()
        .any(|e| e.condition.as_deref() == Some("done")));

    let result = dry_run(&parsed.cfg, &ParamBindings::new());
    let simulated_iterations = result
        .trace
        .iter()
        .filter(|e| e.sql_text == "simulated — 1 iteration")
        .count();
    assert_eq!(simulated_iterations, 1);
    assert_eq!(result.trace.last().unwrap().event_type, EventType::Complete);
}

// ============================================================================
// Scenario: TRY/CATCH
// ============================================================================

#[test]
fn test_try_catch_structure() {
    let parsed = parse(
        "BEGIN TRY SELECT 1; END TRY BEGIN CATCH SELECT ERROR_MESSAGE(); END CATCH",
    )
    .unwrap();

    let try_nodes: Vec<_> = parsed.cfg.nodes_of_kind(NodeKind::TryCatch).collect();
    assert_eq!(try_nodes.len(), 1);
    assert!(try_nodes[0]
        .edges
        .iter()
        .any(|e| e.condition.as_deref() == Some("error")));
    assert_eq!(parsed.cfg.nodes_of_kind(NodeKind::CatchBlock).count(), 1);

    // Merge reachable from both tails
    let success_target = parsed
        .cfg
        .nodes
        .iter()
        .flat_map(|n| &n.edges)
        .find(|e| e.condition.as_deref() == Some("success"))
        .map(|e| e.target_node_id.clone())
        .unwrap();
    let handled_target = parsed
        .cfg
        .nodes
        .iter()
        .flat_map(|n| &n.edges)
        .find(|e| e.condition.as_deref() == Some("handled"))
        .map(|e| e.target_node_id.clone())
        .unwrap();
    assert_eq!(success_target, handled_target);
}

// ============================================================================
// Scenario: multi-parameter header
// ============================================================================

#[test]
fn test_multi_parameter_header() {
    let parsed = parse(
        "CREATE PROCEDURE p @A INT, @B NVARCHAR(100) = 'hello', @C DECIMAL(10,2) OUTPUT AS BEGIN SELECT 1; END",
    )
    .unwrap();

    assert_eq!(parsed.params.len(), 3);
    assert_eq!(parsed.params[1].default_value.as_deref(), Some("'hello'"));
    assert!(parsed.params[1].has_default);
    assert!(parsed.params[2].is_output);
}

// ============================================================================
// Scenario: sandbox inference + seeding + resultset
// ============================================================================

#[test]
fn test_sandbox_inference_and_seeding_scenario() {
    let text = "CREATE PROCEDURE GetActive @Active BIT AS BEGIN\nSELECT ProductId, Name, Price\nFROM Products\nWHERE IsActive = @Active;\nEND";
    let parsed = parse(text).unwrap();
    let bindings = ParamBindings::new().with("@Active", ParamValue::Int(1));
    let result = sandbox_run(&parsed.cfg, text, &bindings);

    let metadata = result.sqlite_metadata.as_ref().unwrap();
    let preview = &metadata.data_preview["Products"];
    for expected in ["ProductId", "Name", "Price", "IsActive"] {
        assert!(
            preview.columns.iter().any(|c| c == expected),
            "missing column {}",
            expected
        );
    }
    assert!(preview.row_count >= 9 && preview.row_count <= 12);

    let resultset = result
        .trace
        .iter()
        .find(|e| e.event_type == EventType::Resultset)
        .expect("resultset event");
    let columns = resultset.columns.as_ref().unwrap();
    assert_eq!(&columns[..3], &["ProductId", "Name", "Price"]);
}

// ============================================================================
// Universal invariants across modes
// ============================================================================

fn assert_trace_invariants(result: &procsim::RunResult) {
    assert_eq!(result.trace.first().unwrap().event_type, EventType::Start);
    assert_eq!(result.trace.last().unwrap().event_type, EventType::Complete);
    for (i, event) in result.trace.iter().enumerate() {
        assert_eq!(event.event_id, i as u64, "event ids must be dense from 0");
    }
}

#[test]
fn test_universal_invariants_hold_for_both_modes() {
    let text = "CREATE PROCEDURE p @X INT AS BEGIN\nIF @X > 0\nBEGIN\nSELECT Name FROM Products;\nEND\nELSE\nBEGIN\nUPDATE Products\nSET Price = 0\nWHERE Id = 1;\nEND\nWHILE @X < 3\nBEGIN\nSET @X = @X + 1\nEND\nEND";
    let parsed = parse(text).unwrap();
    parsed.cfg.validate().unwrap();

    for bindings in [
        ParamBindings::new(),
        ParamBindings::new().with("@X", ParamValue::Int(1)),
        ParamBindings::new().with("@X", ParamValue::Null),
    ] {
        let dry = dry_run(&parsed.cfg, &bindings);
        assert_trace_invariants(&dry);
        for id in &dry.executed_nodes {
            assert!(parsed.cfg.node(id).is_some());
        }
        for key in &dry.executed_edges {
            let (source, target) = key.split_once("->").unwrap();
            assert!(parsed.cfg.has_edge(source, target));
        }

        let sandboxed = sandbox_run(&parsed.cfg, text, &bindings);
        assert_trace_invariants(&sandboxed);
        for id in &sandboxed.executed_nodes {
            assert!(parsed.cfg.node(id).is_some());
        }
    }
}

#[test]
fn test_reparse_yields_equivalent_graph() {
    let text = "IF @A = 1 BEGIN SELECT 1; END ELSE BEGIN SELECT 2; END";
    let first = parse(text).unwrap();
    let second = parse(text).unwrap();
    assert_eq!(first.cfg.nodes.len(), second.cfg.nodes.len());
    for (a, b) in first.cfg.nodes.iter().zip(second.cfg.nodes.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.edges.len(), b.edges.len());
    }
}
