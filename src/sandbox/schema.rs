//! Schema inference from statement usage patterns.
//!
//! The sandbox has no catalog to read, so it reconstructs a plausible
//! schema from the adapted statements themselves. Four reference patterns
//! feed a table → column-set map:
//!
//! 1. `FROM|JOIN|INTO|UPDATE <table>` registers the table.
//! 2. `SELECT <cols> FROM <table>` contributes the select-list columns
//!    (trailing identifier of each expression; `*` and aggregates none).
//! 3. `UPDATE <table> SET <col> = …` contributes assignment targets.
//! 4. `INSERT INTO <table> (<cols>)` contributes the listed columns.
//!
//! Column types are guessed from the column name by a fixed precedence of
//! substring rules.

use once_cell::sync::Lazy;
use regex::Regex;

static TABLE_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN|INTO|UPDATE)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static SELECT_COLS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\bSELECT\s+(.*?)\s+FROM\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static UPDATE_SET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bUPDATE\s+([A-Za-z_][A-Za-z0-9_]*)\s+SET\s+(.*?)(?:\bWHERE\b|;|$)").unwrap()
});
static INSERT_COLS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bINSERT\s+INTO\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)").unwrap()
});
static TRAILING_IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*$").unwrap());

/// One inferred table with its columns in discovery order.
#[derive(Debug, Clone)]
pub struct InferredTable {
    pub name: String,
    pub columns: Vec<String>,
}

impl InferredTable {
    fn add_column(&mut self, column: &str) {
        let column = column.trim();
        if column.is_empty() || column.eq_ignore_ascii_case("id") {
            // The synthetic primary key covers Id
            return;
        }
        if !self
            .columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
        {
            self.columns.push(column.to_string());
        }
    }
}

/// The full inferred schema, tables in discovery order.
#[derive(Debug, Clone, Default)]
pub struct InferredSchema {
    pub tables: Vec<InferredTable>,
}

impl InferredSchema {
    fn table(&mut self, name: &str) -> &mut InferredTable {
        let position = self
            .tables
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name));
        match position {
            Some(i) => &mut self.tables[i],
            None => {
                self.tables.push(InferredTable {
                    name: name.to_string(),
                    columns: Vec::new(),
                });
                self.tables.last_mut().unwrap()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// SQL keywords that the bare table-reference pattern can false-positive on.
const NOT_TABLES: &[&str] = &["SELECT", "WHERE", "SET", "VALUES", "INTO", "FROM"];

/// Infer the referenced-table schema from an adapted body.
pub fn infer_schema(adapted_body: &str) -> InferredSchema {
    let mut schema = InferredSchema::default();

    for caps in TABLE_REF_RE.captures_iter(adapted_body) {
        let name = &caps[1];
        if NOT_TABLES.iter().any(|k| name.eq_ignore_ascii_case(k)) {
            continue;
        }
        schema.table(name);
    }

    for caps in SELECT_COLS_RE.captures_iter(adapted_body) {
        let cols = caps[1].to_string();
        let table = caps[2].to_string();
        let table = schema.table(&table);
        for expr in split_top_level(&cols) {
            if let Some(column) = trailing_identifier(&expr) {
                table.add_column(&column);
            }
        }
    }

    for caps in UPDATE_SET_RE.captures_iter(adapted_body) {
        let table_name = caps[1].to_string();
        let assignments = caps[2].to_string();
        let table = schema.table(&table_name);
        for assignment in split_top_level(&assignments) {
            if let Some((lhs, _)) = assignment.split_once('=') {
                let column = lhs.trim();
                let column = column.rsplit('.').next().unwrap_or(column);
                table.add_column(column);
            }
        }
    }

    for caps in INSERT_COLS_RE.captures_iter(adapted_body) {
        let table_name = caps[1].to_string();
        let cols = caps[2].to_string();
        let table = schema.table(&table_name);
        for column in split_top_level(&cols) {
            table.add_column(column.trim());
        }
    }

    schema
}

/// Split a comma-separated list at parenthesis depth zero.
fn split_top_level(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in list.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// The trailing identifier of a select-list expression: handles aliases
/// (`t.Col AS X` → `X`, `t.Col` → `Col`). `*` and `COUNT(*)`-style
/// expressions contribute nothing.
fn trailing_identifier(expr: &str) -> Option<String> {
    let expr = expr.trim();
    if expr == "*" || expr.ends_with('*') || expr.ends_with(')') {
        return None;
    }
    TRAILING_IDENT_RE
        .captures(expr)
        .map(|caps| caps[1].to_string())
}

/// Guess a SQLite column type from the column name. Rules apply in
/// precedence order, first match wins.
pub fn infer_column_type(column: &str) -> &'static str {
    let name = column.to_lowercase();
    if name.contains("id") && !name.contains("guid") {
        "INTEGER"
    } else if ["price", "cost", "amount", "total"]
        .iter()
        .any(|k| name.contains(k))
    {
        "REAL"
    } else if ["qty", "quantity", "stock", "count", "num"]
        .iter()
        .any(|k| name.contains(k))
    {
        "INTEGER"
    } else if ["rate", "percent", "ratio"].iter().any(|k| name.contains(k)) {
        "REAL"
    } else if ["date", "time", "created", "updated", "modified"]
        .iter()
        .any(|k| name.contains(k))
    {
        "TEXT"
    } else if ["active", "is", "has", "flag", "enabled"]
        .iter()
        .any(|k| name.contains(k))
    {
        "INTEGER"
    } else {
        "TEXT"
    }
}

/// CREATE TABLE statement for an inferred table: synthetic autoincrement
/// primary key plus every inferred column, nullable.
pub fn create_table_sql(table: &InferredTable) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (Id INTEGER PRIMARY KEY AUTOINCREMENT",
        table.name
    );
    for column in &table.columns {
        sql.push_str(&format!(
            ", {} {} DEFAULT NULL",
            column,
            infer_column_type(column)
        ));
    }
    sql.push(')');
    sql
}
