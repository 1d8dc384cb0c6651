//! Procedure parameters and per-run parameter bindings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A declared procedure parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcParameter {
    /// Parameter name including the leading `@`
    pub name: String,
    /// SQL type as written (e.g. "INT", "NVARCHAR(100)", "DECIMAL(10,2)")
    pub sql_type: String,
    /// Whether the parameter is OUTPUT/OUT
    pub is_output: bool,
    /// Whether a default value was declared
    pub has_default: bool,
    /// The default value literal, if declared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// A value bound to a parameter for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Numeric view of the value, when one exists.
    ///
    /// Text parses as a number when it looks like one, matching the
    /// coerce-both-sides-to-float comparison rule.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Null => None,
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// String view used by the case-insensitive comparison fallback.
    pub fn as_text(&self) -> String {
        match self {
            ParamValue::Null => String::new(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => s.clone(),
        }
    }

    /// Render as a SQL literal (quotes doubled inside strings).
    pub fn to_sql_literal(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Parse a CLI-style value: `null`, integer, float, or bare text.
    pub fn parse_loose(raw: &str) -> ParamValue {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return ParamValue::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return ParamValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return ParamValue::Float(f);
        }
        let unquoted = trimmed
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .unwrap_or(trimmed);
        ParamValue::Text(unquoted.to_string())
    }
}

/// An immutable per-run parameter binding map.
///
/// Keys are normalised on insert: a leading `@` is enforced and lookups are
/// case-insensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamBindings {
    values: HashMap<String, ParamValue>,
}

fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with('@') {
        trimmed.to_lowercase()
    } else {
        format!("@{}", trimmed.to_lowercase())
    }
}

impl ParamBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: ParamValue) {
        self.values.insert(normalize_name(name), value);
    }

    /// Builder-style insert for tests and call sites that chain.
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(&normalize_name(name))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }
}
