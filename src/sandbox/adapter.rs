//! Textual rewriting of T-SQL statements into SQLite-compatible form.
//!
//! A fixed sequence of substitutions: function renames, type
//! simplifications, schema-prefix stripping and hint stripping. Order only
//! matters for the hint rules: the specific `WITH (NOLOCK)` rule must run
//! before the general `WITH (...)` rule.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::params::{ParamBindings, ParamValue};

static REWRITES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // Function renames
        (Regex::new(r"(?i)GETDATE\s*\(\s*\)").unwrap(), "datetime('now')"),
        (
            Regex::new(r"(?i)SYSDATETIME\s*\(\s*\)").unwrap(),
            "datetime('now')",
        ),
        (
            Regex::new(r"(?i)NEWID\s*\(\s*\)").unwrap(),
            "hex(randomblob(16))",
        ),
        // Type simplifications
        (
            Regex::new(r"(?i)\bNVARCHAR\s*\(\s*(?:\d+|MAX)\s*\)").unwrap(),
            "TEXT",
        ),
        (
            Regex::new(r"(?i)\bVARCHAR\s*\(\s*(?:\d+|MAX)\s*\)").unwrap(),
            "TEXT",
        ),
        (
            Regex::new(r"(?i)\bDECIMAL\s*\(\s*\d+\s*,\s*\d+\s*\)").unwrap(),
            "REAL",
        ),
        (Regex::new(r"(?i)\bFLOAT\b").unwrap(), "REAL"),
        (Regex::new(r"(?i)\bBIT\b").unwrap(), "INTEGER"),
        (
            Regex::new(r"(?i)\bIDENTITY\s*\(\s*\d+\s*,\s*\d+\s*\)").unwrap(),
            "AUTOINCREMENT",
        ),
        // Schema stripping
        (Regex::new(r"(?i)\bdbo\s*\.\s*").unwrap(), ""),
        // Hint stripping: TOP n, then NOLOCK before the general WITH rule
        (Regex::new(r"(?i)\bTOP\s+\(?\s*\d+\s*\)?").unwrap(), ""),
        (
            Regex::new(r"(?i)\bWITH\s*\(\s*NOLOCK\s*\)").unwrap(),
            "",
        ),
        (
            Regex::new(r"(?i)\bWITH\s*\((?:\s*\w+\s*,?)*\)").unwrap(),
            "",
        ),
    ]
});

static PARAM_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());

/// Rewrite one statement for the SQLite engine.
pub fn adapt_statement(sql: &str) -> String {
    let mut adapted = sql.to_string();
    for (pattern, replacement) in REWRITES.iter() {
        adapted = pattern.replace_all(&adapted, *replacement).into_owned();
    }
    adapted
}

/// Substitute parameter references with bound literals; unbound parameters
/// become NULL.
pub fn bind_parameters(sql: &str, bindings: &ParamBindings) -> String {
    PARAM_REF_RE
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            bindings
                .get(&caps[0])
                .unwrap_or(&ParamValue::Null)
                .to_sql_literal()
        })
        .into_owned()
}
