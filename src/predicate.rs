//! Best-effort static evaluation of branch predicates.
//!
//! The evaluator decides simple predicates over procedure parameters from a
//! binding map, and reports everything else as unpredictable. Supported
//! shapes (case-insensitive):
//!
//! - `@P IS NULL` / `@P IS NOT NULL`
//! - `@P <op> <literal>` for `=`, `!=`, `<>`, `>`, `>=`, `<`, `<=`, where
//!   the literal is a number or a single-quoted string
//!
//! Comparisons coerce both sides to floating point first; when the literal
//! is a quoted string they fall back to a case-insensitive string
//! comparison. SQL three-valued logic is preserved:
//! a null-valued parameter makes every comparison unpredictable rather than
//! false, and an unbound parameter is always unpredictable.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::params::{ParamBindings, ParamValue};

static NULL_CHECK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^@(\w+)\s+IS\s+(NOT\s+)?NULL$").unwrap()
});

static COMPARISON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^@(\w+)\s*(=|!=|<>|>=|<=|>|<)\s*('(?:[^']*)'|[-+]?\d+(?:\.\d+)?)$").unwrap()
});

/// Evaluate a predicate snippet against a parameter binding.
///
/// Returns `Some(bool)` only when confident; `None` means unpredictable.
pub fn evaluate(predicate: &str, bindings: &ParamBindings) -> Option<bool> {
    let trimmed = strip_outer_parens(predicate.trim());

    if let Some(caps) = NULL_CHECK_RE.captures(trimmed) {
        let value = bindings.get(&caps[1])?;
        let negated = caps.get(2).is_some();
        return Some(value.is_null() != negated);
    }

    if let Some(caps) = COMPARISON_RE.captures(trimmed) {
        let value = bindings.get(&caps[1])?;
        if value.is_null() {
            // NULL <op> anything is UNKNOWN, not false
            return None;
        }
        let op = &caps[2];
        let literal = &caps[3];
        return compare(value, literal, op);
    }

    None
}

/// Peel matched outer parentheses: `(( @X > 0 ))` → `@X > 0`.
fn strip_outer_parens(mut s: &str) -> &str {
    loop {
        let t = s.trim();
        if t.len() >= 2 && t.starts_with('(') && t.ends_with(')') {
            // Only strip when the parens actually match each other
            let inner = &t[1..t.len() - 1];
            let mut depth = 0i32;
            let balanced = inner.chars().all(|c| {
                match c {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                depth >= 0
            }) && depth == 0;
            if balanced {
                s = inner;
                continue;
            }
        }
        return t;
    }
}

fn compare(value: &ParamValue, literal: &str, op: &str) -> Option<bool> {
    let quoted = literal.starts_with('\'');
    let literal_text = literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(literal);

    // Numeric comparison first
    if let (Some(lhs), Ok(rhs)) = (value.as_f64(), literal_text.trim().parse::<f64>()) {
        return Some(apply_op(lhs.partial_cmp(&rhs), op));
    }

    // String fallback only applies when the literal is a string; a numeric
    // literal against a non-numeric value is unpredictable
    if !quoted {
        return None;
    }
    let lhs = value.as_text().to_lowercase();
    let rhs = literal_text.to_lowercase();
    Some(apply_op(Some(lhs.cmp(&rhs)), op))
}

fn apply_op(ordering: Option<Ordering>, op: &str) -> bool {
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        "=" => ordering == Ordering::Equal,
        "!=" | "<>" => ordering != Ordering::Equal,
        ">" => ordering == Ordering::Greater,
        ">=" => ordering != Ordering::Less,
        "<" => ordering == Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        _ => false,
    }
}
