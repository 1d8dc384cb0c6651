//! Procedure parsing tests

use std::io::Write;

use tempfile::NamedTempFile;

/// Helper to create a temp SQL file with content
fn create_sql_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".sql").unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// ============================================================================
// Header and parameter parsing
// ============================================================================

#[test]
fn test_parse_procedure_with_single_parameter() {
    let parsed = procsim::parse(
        "CREATE PROCEDURE p @Id INT AS BEGIN SELECT * FROM Products WHERE Id = @Id; END",
    )
    .unwrap();

    assert_eq!(parsed.params.len(), 1);
    let param = &parsed.params[0];
    assert_eq!(param.name, "@Id");
    assert_eq!(param.sql_type, "INT");
    assert!(!param.is_output);
    assert!(!param.has_default);
    assert!(param.default_value.is_none());
}

#[test]
fn test_parse_multiple_parameters_defaults_and_output() {
    let parsed = procsim::parse(
        "CREATE PROCEDURE dbo.Report @A INT, @B NVARCHAR(100) = 'hello', @C DECIMAL(10,2) OUTPUT AS BEGIN SELECT 1; END",
    )
    .unwrap();

    assert_eq!(parsed.params.len(), 3);

    assert_eq!(parsed.params[0].name, "@A");
    assert_eq!(parsed.params[0].sql_type, "INT");

    assert_eq!(parsed.params[1].name, "@B");
    assert!(parsed.params[1].has_default);
    assert_eq!(parsed.params[1].default_value.as_deref(), Some("'hello'"));

    assert_eq!(parsed.params[2].name, "@C");
    assert_eq!(parsed.params[2].sql_type, "DECIMAL(10,2)");
    assert!(parsed.params[2].is_output);
}

#[test]
fn test_parse_create_or_alter() {
    let parsed =
        procsim::parse("CREATE OR ALTER PROC reporting.Cleanup AS DELETE FROM Logs;").unwrap();
    assert_eq!(parsed.name.as_deref(), Some("reporting.Cleanup"));
}

#[test]
fn test_parse_batch_without_header() {
    let parsed = procsim::parse("SELECT 1;\nUPDATE T SET X = 2;").unwrap();
    assert!(parsed.name.is_none());
    assert!(parsed.params.is_empty());
}

#[test]
fn test_parse_empty_text_is_rejected() {
    let result = procsim::parse("   ");
    assert!(matches!(
        result,
        Err(procsim::ProcSimError::BadInput { .. })
    ));
}

// ============================================================================
// File-based parsing
// ============================================================================

#[test]
fn test_parse_file() {
    let file = create_sql_file(
        "CREATE PROCEDURE dbo.GetUsers @MinAge INT = 18 AS\nBEGIN\n    SELECT UserName, Email FROM Users WHERE Age >= @MinAge;\nEND",
    );

    let parsed = procsim::parse_file(file.path()).unwrap();
    assert_eq!(parsed.name.as_deref(), Some("dbo.GetUsers"));
    assert_eq!(parsed.params.len(), 1);
    assert!(parsed.params[0].has_default);
}

#[test]
fn test_parse_file_missing() {
    let result = procsim::parse_file(std::path::Path::new("/nonexistent/file.sql"));
    assert!(result.is_err());
}

// ============================================================================
// Snippets and line numbers
// ============================================================================

#[test]
fn test_node_snippets_are_verbatim() {
    let parsed = procsim::parse(
        "CREATE PROCEDURE p AS\nBEGIN\n    SELECT Name\n    FROM Products;\nEND",
    )
    .unwrap();

    let select = parsed
        .cfg
        .nodes_of_kind(procsim::NodeKind::Select)
        .next()
        .unwrap();
    assert_eq!(select.sql_snippet, "SELECT Name\n    FROM Products");
    assert_eq!(select.start_line, 3);
    assert_eq!(select.end_line, 4);
}

#[test]
fn test_branch_snippet_is_the_condition() {
    let parsed = procsim::parse("IF @Count > 100 SELECT 'big' ELSE SELECT 'small'").unwrap();
    let branch = parsed
        .cfg
        .nodes_of_kind(procsim::NodeKind::Branch)
        .next()
        .unwrap();
    assert_eq!(branch.sql_snippet, "@Count > 100");
    assert_eq!(branch.label, "IF @Count > 100");
}
