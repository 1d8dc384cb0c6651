//! Procedure body extraction and top-level statement splitting.
//!
//! The sandbox does not execute the body through the AST: it recovers a
//! flat stream of DML statements by scanning the body line by line, which
//! is deliberately lossy. Control and metadata lines are dropped, but the
//! IF/ELSE arm in effect when a statement opens is recorded so the
//! orchestrator can classify statements as on- or off-branch. Only one
//! level of arm context is tracked; deeply nested DML is still captured
//! but may be attributed to the outer arm.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::util::starts_with_ci;

/// The IF/ELSE arm a statement was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchArm {
    If,
    ElseIf,
    Else,
}

/// One recovered top-level statement.
#[derive(Debug, Clone)]
pub struct SplitStatement {
    pub text: String,
    /// Arm context at the opening line; `None` for unconditional statements.
    pub arm: Option<BranchArm>,
    /// 1-based line within the body where the statement opened.
    pub line: usize,
}

/// A conditional line (IF / ELSE IF / ELSE) found in the body, in order.
#[derive(Debug, Clone)]
pub struct BranchLine {
    pub arm: BranchArm,
    /// The condition text; `None` for a bare ELSE.
    pub condition: Option<String>,
}

static AS_BEGIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\bAS\s+BEGIN\b").unwrap());
static PROC_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\b(?:CREATE|ALTER)\s+(?:OR\s+ALTER\s+)?PROC(?:EDURE)?\b").unwrap());
static BARE_AS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\bAS\b").unwrap());
static LAST_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bEND\b").unwrap());

/// Statement opener keywords: a line beginning with one of these opens a
/// new statement.
const OPENERS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "WITH"];

/// Control/metadata line prefixes. These never open a statement, and they
/// close a statement still being accumulated.
const CONTROL_PREFIXES: &[&str] = &[
    "DECLARE", "IF", "ELSE", "BEGIN", "END", "RETURN", "RAISERROR", "EXEC", "PRINT", "WHILE",
    "COMMIT", "ROLLBACK", "BREAK", "CONTINUE", "GO",
];

/// Isolate the procedure body.
///
/// With a `CREATE/ALTER PROCEDURE … AS BEGIN` wrapper the body lies between
/// `AS BEGIN` and the final `END`; without a wrapper the whole text is the
/// body.
pub fn extract_body(text: &str) -> &str {
    if !PROC_HEADER_RE.is_match(text) {
        return text;
    }

    if let Some(m) = AS_BEGIN_RE.find(text) {
        let after = &text[m.end()..];
        if let Some(last_end) = LAST_END_RE.find_iter(after).last() {
            return &after[..last_end.start()];
        }
        return after;
    }

    // Headers without BEGIN: body is everything after the first AS
    if let Some(m) = BARE_AS_RE.find(text) {
        return &text[m.end()..];
    }
    text
}

fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

fn is_opener(line: &str) -> bool {
    let word = first_word(line);
    OPENERS.iter().any(|o| word.eq_ignore_ascii_case(o))
}

fn is_control_line(line: &str) -> bool {
    let word = first_word(line);
    if word.eq_ignore_ascii_case("SET") {
        // SET @var is a metadata line; SET col = … continues an UPDATE
        return line
            .split_whitespace()
            .nth(1)
            .map(|w| w.starts_with('@'))
            .unwrap_or(true);
    }
    CONTROL_PREFIXES.iter().any(|c| word.eq_ignore_ascii_case(c))
}

/// Split the body into top-level statements with branch-arm annotations.
pub fn split_statements(body: &str) -> Vec<SplitStatement> {
    let mut statements = Vec::new();
    let mut current: Option<SplitStatement> = None;
    let mut arm: Option<BranchArm> = None;

    for (i, raw_line) in body.lines().enumerate() {
        let line = raw_line.trim();

        if let Some(statement) = current.as_mut() {
            if line.is_empty() || is_control_line(line) {
                statements.push(current.take().unwrap());
                // fall through so a control line still updates arm state
            } else {
                statement.text.push(' ');
                statement.text.push_str(line);
                if line.ends_with(';') {
                    statements.push(current.take().unwrap());
                }
                continue;
            }
        }

        if line.is_empty() {
            continue;
        }

        // Arm tracking (single level)
        if starts_with_ci(line, "ELSE IF") {
            arm = Some(BranchArm::ElseIf);
        } else if starts_with_ci(line, "IF") && first_word(line).eq_ignore_ascii_case("IF") {
            arm = Some(BranchArm::If);
        } else if first_word(line).eq_ignore_ascii_case("ELSE") {
            arm = Some(BranchArm::Else);
        } else if first_word(line).eq_ignore_ascii_case("END") {
            arm = None;
        }

        if is_opener(line) {
            let statement = SplitStatement {
                text: line.to_string(),
                arm,
                line: i + 1,
            };
            if line.ends_with(';') {
                statements.push(statement);
            } else {
                current = Some(statement);
            }
        }
    }

    if let Some(statement) = current.take() {
        statements.push(statement);
    }

    for statement in &mut statements {
        let trimmed = statement.text.trim_end_matches(';').trim().to_string();
        statement.text = trimmed;
    }

    statements
}

/// Collect the IF / ELSE IF / ELSE lines of the body in order, with their
/// condition text (trailing inline BEGIN stripped).
pub fn collect_branch_lines(body: &str) -> Vec<BranchLine> {
    let mut lines = Vec::new();

    for raw_line in body.lines() {
        let line = raw_line.trim();
        if starts_with_ci(line, "ELSE IF") {
            lines.push(BranchLine {
                arm: BranchArm::ElseIf,
                condition: Some(clean_condition(&line[7..])),
            });
        } else if first_word(line).eq_ignore_ascii_case("IF") {
            lines.push(BranchLine {
                arm: BranchArm::If,
                condition: Some(clean_condition(&line[2..])),
            });
        } else if first_word(line).eq_ignore_ascii_case("ELSE") {
            lines.push(BranchLine {
                arm: BranchArm::Else,
                condition: None,
            });
        }
    }

    lines
}

fn clean_condition(rest: &str) -> String {
    let mut condition = rest.trim();
    if condition.len() >= 5 && condition[condition.len() - 5..].eq_ignore_ascii_case("BEGIN") {
        condition = condition[..condition.len() - 5].trim_end();
    }
    condition.to_string()
}
