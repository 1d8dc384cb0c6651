//! Sandbox component tests: splitting, adaptation, inference, seeding

use procsim::sandbox::{
    adapt_statement, extract_body, infer_column_type, infer_schema, split_statements,
};
use procsim::trace::EventType;
use procsim::{parse, sandbox_run, ParamBindings, ParamValue};

// ============================================================================
// Body extraction and splitting
// ============================================================================

#[test]
fn test_body_extraction_strips_wrapper() {
    let text = "CREATE PROCEDURE dbo.P @Id INT AS BEGIN\nSELECT 1;\nEND";
    let body = extract_body(text);
    assert!(!body.contains("CREATE PROCEDURE"));
    assert!(body.contains("SELECT 1;"));
}

#[test]
fn test_split_drops_control_lines() {
    let body = "DECLARE @x INT\nSET @x = 1\nSELECT * FROM T;\nPRINT 'done'\nRETURN";
    let statements = split_statements(body);
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].text, "SELECT * FROM T");
}

#[test]
fn test_split_keeps_create_and_drop() {
    let body = "CREATE TABLE Staging (Id INT);\nDROP TABLE Staging;";
    let statements = split_statements(body);
    assert_eq!(statements.len(), 2);
}

// ============================================================================
// Adaptation
// ============================================================================

#[test]
fn test_adapter_rewrites_tsql_functions_and_types() {
    let adapted = adapt_statement(
        "INSERT INTO Logs (CreatedAt, Token) VALUES (GETDATE(), NEWID())",
    );
    assert!(adapted.contains("datetime('now')"));
    assert!(adapted.contains("hex(randomblob(16))"));
    assert!(!adapted.to_uppercase().contains("GETDATE"));
}

#[test]
fn test_adapter_strips_schema_and_hints() {
    let adapted = adapt_statement("SELECT TOP 5 Name FROM dbo.Products WITH (NOLOCK)");
    assert!(!adapted.contains("dbo."));
    assert!(!adapted.to_uppercase().contains("TOP"));
    assert!(!adapted.to_uppercase().contains("NOLOCK"));
}

// ============================================================================
// Schema inference
// ============================================================================

#[test]
fn test_inference_collects_all_four_patterns() {
    let body = "SELECT a.Name FROM Accounts a\nUPDATE Accounts SET Balance = 0 WHERE Id = 1\nINSERT INTO AuditLog (Action, LoggedAt) VALUES ('reset', GETDATE())\nSELECT 1 FROM History JOIN Accounts ON 1 = 1";
    let schema = infer_schema(body);

    let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"Accounts"));
    assert!(names.contains(&"AuditLog"));
    assert!(names.contains(&"History"));

    let accounts = schema
        .tables
        .iter()
        .find(|t| t.name == "Accounts")
        .unwrap();
    assert!(accounts.columns.contains(&"Name".to_string()));
    assert!(accounts.columns.contains(&"Balance".to_string()));
}

#[test]
fn test_type_rules_precedence() {
    // "id" beats the later rules, "guid" opts out of it
    assert_eq!(infer_column_type("OrderId"), "INTEGER");
    assert_eq!(infer_column_type("OrderGuid"), "TEXT");
    // price-ish beats count-ish order of appearance
    assert_eq!(infer_column_type("TotalCount"), "REAL");
    assert_eq!(infer_column_type("ModifiedTime"), "TEXT");
    assert_eq!(infer_column_type("HasStock"), "INTEGER");
}

// ============================================================================
// End-to-end sandbox behaviour
// ============================================================================

fn run_sandbox(text: &str, bindings: ParamBindings) -> procsim::RunResult {
    let parsed = parse(text).unwrap();
    sandbox_run(&parsed.cfg, text, &bindings)
}

#[test]
fn test_sandbox_creates_and_previews_tables() {
    let text = "CREATE PROCEDURE p @Active BIT AS BEGIN\nSELECT ProductId, Name, Price\nFROM Products\nWHERE IsActive = @Active;\nEND";
    let result = run_sandbox(text, ParamBindings::new().with("@Active", ParamValue::Int(1)));

    let metadata = result.sqlite_metadata.unwrap();
    assert_eq!(metadata.tables_created, vec!["Products".to_string()]);

    let preview = &metadata.data_preview["Products"];
    assert!(preview.columns.iter().any(|c| c == "ProductId"));
    assert!(preview.columns.iter().any(|c| c == "IsActive"));
    assert!(preview.sample_rows.len() <= 3);
    assert!(preview.row_count >= 9 && preview.row_count <= 12);
    assert_eq!(metadata.total_rows_generated, preview.row_count);
}

#[test]
fn test_sandbox_mode_and_envelope() {
    let result = run_sandbox("SELECT 1 AS One;", ParamBindings::new());
    assert_eq!(result.summary.mode, "sqlite");
    assert_eq!(result.trace.first().unwrap().event_type, EventType::Start);
    assert_eq!(result.trace.last().unwrap().event_type, EventType::Complete);
    assert!(result.executed_edges.is_empty());
}

#[test]
fn test_sandbox_seeding_is_reproducible_across_runs() {
    let text = "SELECT ProductId, Name, Price FROM Products WHERE IsActive = 1;";
    let a = run_sandbox(text, ParamBindings::new());
    let b = run_sandbox(text, ParamBindings::new());

    let preview_a = &a.sqlite_metadata.unwrap().data_preview["Products"];
    let preview_b = &b.sqlite_metadata.unwrap().data_preview["Products"];
    assert_eq!(preview_a.sample_rows, preview_b.sample_rows);
    assert_eq!(preview_a.row_count, preview_b.row_count);
}

#[test]
fn test_sandbox_branch_skipping() {
    let text = "IF @Mode = 'read'\nBEGIN\nSELECT Name FROM Products;\nEND\nELSE\nBEGIN\nDELETE FROM Products;\nEND";
    let result = run_sandbox(
        text,
        ParamBindings::new().with("@Mode", ParamValue::Text("read".into())),
    );

    let skipped = result
        .trace
        .iter()
        .filter(|e| e.event_type == EventType::ControlFlow)
        .count();
    assert_eq!(skipped, 1);

    // The DELETE never ran: the seeded table keeps its rows
    let metadata = result.sqlite_metadata.unwrap();
    assert!(metadata.data_preview["Products"].row_count > 0);
}

#[test]
fn test_sandbox_statement_events_carry_node_ids() {
    let text = "SELECT Name FROM Products;";
    let parsed = parse(text).unwrap();
    let result = sandbox_run(&parsed.cfg, text, &ParamBindings::new());

    let statement_event = result
        .trace
        .iter()
        .find(|e| e.event_type == EventType::Statement)
        .unwrap();
    let node_id = statement_event.node_id.as_ref().expect("correlated node");
    let node = parsed.cfg.node(node_id).unwrap();
    assert_eq!(node.kind, procsim::NodeKind::Select);
    assert!(result.executed_nodes.contains(node_id));
}

#[test]
fn test_sandbox_survives_engine_errors() {
    let text = "SELECT BadFunc(1) FROM Products;\n\nSELECT Name FROM Products;";
    let result = run_sandbox(text, ParamBindings::new());
    assert!(result.summary.had_error);
    let resultsets = result
        .trace
        .iter()
        .filter(|e| e.event_type == EventType::Resultset)
        .count();
    assert_eq!(resultsets, 1, "the second statement still executed");
}
