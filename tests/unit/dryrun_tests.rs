//! Dry-run walker tests

use procsim::trace::EventType;
use procsim::{dry_run, parse, NodeKind, ParamBindings, ParamValue};

fn run(sql: &str, bindings: ParamBindings) -> (procsim::ControlFlowGraph, procsim::RunResult) {
    let parsed = parse(sql).unwrap();
    let result = dry_run(&parsed.cfg, &bindings);
    (parsed.cfg, result)
}

#[test]
fn test_trace_is_bracketed_and_monotonic() {
    let (_, result) = run("SELECT 1;\nSELECT 2;", ParamBindings::new());

    assert_eq!(result.trace.first().unwrap().event_type, EventType::Start);
    assert_eq!(result.trace.last().unwrap().event_type, EventType::Complete);
    for (i, event) in result.trace.iter().enumerate() {
        assert_eq!(event.event_id, i as u64);
    }
    assert_eq!(result.summary.mode, "dryrun");
}

#[test]
fn test_true_branch_taken() {
    let bindings = ParamBindings::new().with("@X", ParamValue::Int(5));
    let (cfg, result) = run(
        "IF @X > 0 BEGIN SELECT 'positive'; END ELSE BEGIN SELECT 'negative'; END",
        bindings,
    );

    let branch_event = result
        .trace
        .iter()
        .find(|e| e.event_type == EventType::Branch)
        .unwrap();
    assert_eq!(branch_event.branch_taken.as_deref(), Some("TRUE (predicted)"));

    let branch = cfg.nodes_of_kind(NodeKind::Branch).next().unwrap();
    let true_edge = branch
        .edges
        .iter()
        .find(|e| e.condition.as_deref() == Some("TRUE"))
        .unwrap();
    let false_edge = branch
        .edges
        .iter()
        .find(|e| e.condition.as_deref() == Some("FALSE"))
        .unwrap();

    let true_key = format!("{}->{}", branch.id, true_edge.target_node_id);
    let false_key = format!("{}->{}", branch.id, false_edge.target_node_id);
    assert!(result.executed_edges.contains(&true_key));
    assert!(!result.executed_edges.contains(&false_key));
}

#[test]
fn test_false_branch_taken() {
    let bindings = ParamBindings::new().with("@X", ParamValue::Int(-1));
    let (_, result) = run(
        "IF @X > 0 BEGIN SELECT 'positive'; END ELSE BEGIN SELECT 'negative'; END",
        bindings,
    );
    let branch_event = result
        .trace
        .iter()
        .find(|e| e.event_type == EventType::Branch)
        .unwrap();
    assert_eq!(
        branch_event.branch_taken.as_deref(),
        Some("FALSE (predicted)")
    );
    // Only the negative arm is simulated
    let simulated: Vec<&str> = result
        .trace
        .iter()
        .filter(|e| e.event_type == EventType::Simulated)
        .map(|e| e.sql_text.as_str())
        .collect();
    assert_eq!(simulated, vec!["SELECT 'negative'"]);
}

#[test]
fn test_unpredictable_branch_walks_both_marks_neither() {
    let bindings = ParamBindings::new().with("@X", ParamValue::Text("some string".into()));
    let (cfg, result) = run(
        "IF @X > 0 BEGIN SELECT 'positive'; END ELSE BEGIN SELECT 'negative'; END",
        bindings,
    );

    let branch_event = result
        .trace
        .iter()
        .find(|e| e.event_type == EventType::Branch)
        .unwrap();
    assert_eq!(branch_event.branch_taken.as_deref(), Some("UNPREDICTABLE"));

    let branch = cfg.nodes_of_kind(NodeKind::Branch).next().unwrap();
    for edge in &branch.edges {
        let key = format!("{}->{}", branch.id, edge.target_node_id);
        assert!(!result.executed_edges.contains(&key));
        assert!(result.executed_nodes.contains(&edge.target_node_id));
    }

    // Both arm statements walked
    let simulated = result
        .trace
        .iter()
        .filter(|e| e.event_type == EventType::Simulated)
        .count();
    assert_eq!(simulated, 2);
}

#[test]
fn test_loop_simulated_once_and_terminates() {
    let (cfg, result) = run(
        "WHILE @I < 10 BEGIN SET @I = @I + 1; END",
        ParamBindings::new(),
    );

    let loops: Vec<_> = cfg.nodes_of_kind(NodeKind::Loop).collect();
    assert_eq!(loops.len(), 1);

    let iterations = result
        .trace
        .iter()
        .filter(|e| e.sql_text == "simulated — 1 iteration")
        .count();
    assert_eq!(iterations, 1);
}

#[test]
fn test_executed_sets_stay_within_graph() {
    let (cfg, result) = run(
        "IF @A = 1 BEGIN WHILE @B < 2 BEGIN SELECT 1; END END ELSE BEGIN SELECT 2; END",
        ParamBindings::new(),
    );
    for id in &result.executed_nodes {
        assert!(cfg.node(id).is_some(), "unknown node {}", id);
    }
    for key in &result.executed_edges {
        let (source, target) = key.split_once("->").unwrap();
        assert!(cfg.has_edge(source, target), "unknown edge {}", key);
    }
}

#[test]
fn test_dry_run_never_reports_errors_on_wellformed_input() {
    let (_, result) = run(
        "BEGIN TRY UPDATE T SET A = 1; END TRY BEGIN CATCH SELECT 1; END CATCH",
        ParamBindings::new(),
    );
    assert!(!result.summary.had_error);
}

#[test]
fn test_run_id_is_twelve_hex_chars() {
    let (_, result) = run("SELECT 1;", ParamBindings::new());
    assert_eq!(result.run_id.len(), 12);
    assert!(result.run_id.chars().all(|c| c.is_ascii_hexdigit()));
}
