//! Token-based procedure body parsing for T-SQL.
//!
//! sqlparser has no native support for imperative T-SQL bodies (IF/ELSE,
//! WHILE, BEGIN TRY/CATCH, batches without semicolons), so the body is
//! parsed by recursive descent over the raw MsSqlDialect token stream into
//! this crate's own `ProcStatement` AST.
//!
//! Statement boundaries are recovered from semicolons where present, and
//! otherwise from statement-opener keywords at parenthesis depth zero. That
//! heuristic is deliberately tolerant: real procedure bodies rarely
//! terminate every statement, and a mis-split degrades into a single wider
//! statement node rather than a parse failure.

use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::Token;

use crate::error::ProcSimError;

use super::tokens::{LineIndex, TokenCursor};

/// Classified leaf statement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Exec,
    DynamicSql,
    Declare,
    Set,
    Transaction,
    Return,
    Print,
    Raiserror,
    Other,
}

/// One statement of a procedure body
#[derive(Debug, Clone)]
pub enum ProcStatement {
    If {
        condition: String,
        then_branch: Vec<ProcStatement>,
        else_branch: Option<Vec<ProcStatement>>,
        start_line: u64,
        end_line: u64,
    },
    While {
        condition: String,
        body: Vec<ProcStatement>,
        start_line: u64,
        end_line: u64,
    },
    TryCatch {
        try_body: Vec<ProcStatement>,
        catch_body: Vec<ProcStatement>,
        start_line: u64,
        end_line: u64,
    },
    Block {
        body: Vec<ProcStatement>,
        start_line: u64,
        end_line: u64,
    },
    Leaf {
        kind: LeafKind,
        sql: String,
        start_line: u64,
        end_line: u64,
    },
}

/// Parse the remaining token stream as a procedure body.
///
/// `cursor` is positioned either at the top of a batch (no procedure
/// header) or just past the header's `AS`.
pub fn parse_body_statements(
    source: &str,
    line_index: &LineIndex,
    cursor: &mut TokenCursor,
) -> Result<Vec<ProcStatement>, ProcSimError> {
    let mut parser = BodyParser {
        source,
        line_index,
        cursor,
    };
    Ok(parser.parse_statements())
}

struct BodyParser<'a, 'b> {
    source: &'a str,
    line_index: &'a LineIndex,
    cursor: &'b mut TokenCursor,
}

/// T-SQL words that open a statement but are not sqlparser keywords.
const WORD_OPENERS: &[&str] = &[
    "EXEC",
    "EXECUTE",
    "PRINT",
    "RAISERROR",
    "BREAK",
    "CONTINUE",
    "THROW",
    "GOTO",
    "WAITFOR",
    "TRUNCATE",
    "WHILE",
];

impl BodyParser<'_, '_> {
    fn parse_statements(&mut self) -> Vec<ProcStatement> {
        let mut statements = Vec::new();
        loop {
            self.cursor.skip_trivia();
            // Stray semicolons and GO separators between statements
            if self.cursor.eat_punct(&Token::SemiColon) || self.cursor.eat_word("GO") {
                continue;
            }
            if self.cursor.is_done()
                || self.cursor.at_keyword(Keyword::END)
                || self.cursor.at_keyword(Keyword::ELSE)
            {
                break;
            }
            statements.push(self.parse_statement());
        }
        statements
    }

    fn parse_statement(&mut self) -> ProcStatement {
        self.cursor.skip_trivia();

        if self.cursor.at_keyword(Keyword::IF) {
            return self.parse_if();
        }
        if self.cursor.at_word("WHILE") {
            return self.parse_while();
        }
        if self.cursor.at_keyword(Keyword::BEGIN) {
            if let Some(next) = self.word_after_current() {
                if next.eq_ignore_ascii_case("TRY") {
                    return self.parse_try_catch();
                }
                if next.eq_ignore_ascii_case("TRAN") || next.eq_ignore_ascii_case("TRANSACTION") {
                    return self.parse_leaf();
                }
            }
            return self.parse_block();
        }
        self.parse_leaf()
    }

    /// The word value of the first significant token after the current one.
    fn word_after_current(&self) -> Option<String> {
        let next = self.cursor.next_significant(self.cursor.pos() + 1)?;
        match &self.cursor.tokens()[next].token {
            Token::Word(w) => Some(w.value.clone()),
            _ => None,
        }
    }

    fn current_line(&self) -> u64 {
        self.cursor
            .peek_significant()
            .map(|t| t.span.start.line)
            .unwrap_or(0)
    }

    /// Line of the most recently consumed significant token.
    fn last_consumed_line(&self) -> u64 {
        let tokens = self.cursor.tokens();
        tokens[..self.cursor.pos()]
            .iter()
            .rev()
            .find(|t| !matches!(t.token, Token::Whitespace(_)))
            .map(|t| t.span.end.line)
            .unwrap_or(0)
    }

    /// Verbatim trimmed source text covered by tokens [start_pos, end_pos].
    fn snippet(&self, start_pos: usize, end_pos: usize) -> String {
        let tokens = self.cursor.tokens();
        if start_pos >= tokens.len() || end_pos < start_pos {
            return String::new();
        }
        let first = &tokens[start_pos];
        let last = &tokens[end_pos.min(tokens.len() - 1)];
        let start =
            self.line_index
                .offset(self.source, first.span.start.line, first.span.start.column);
        let end = self
            .line_index
            .offset(self.source, last.span.end.line, last.span.end.column);
        if end <= start {
            return String::new();
        }
        self.source[start..end].trim().to_string()
    }

    fn parse_if(&mut self) -> ProcStatement {
        let start_line = self.current_line();
        self.cursor.eat_keyword(Keyword::IF);

        let condition = self.parse_condition();
        let then_branch = self.parse_arm();

        let else_branch = if self.cursor.eat_keyword(Keyword::ELSE) {
            self.cursor.skip_trivia();
            if self.cursor.at_keyword(Keyword::IF) {
                // ELSE IF chains nest as a single-statement else arm
                Some(vec![self.parse_if()])
            } else {
                Some(self.parse_arm())
            }
        } else {
            None
        };

        ProcStatement::If {
            condition,
            then_branch,
            else_branch,
            start_line,
            end_line: self.last_consumed_line(),
        }
    }

    fn parse_while(&mut self) -> ProcStatement {
        let start_line = self.current_line();
        self.cursor.eat_word("WHILE");

        let condition = self.parse_condition();
        let body = self.parse_arm();

        ProcStatement::While {
            condition,
            body,
            start_line,
            end_line: self.last_consumed_line(),
        }
    }

    /// Collect condition tokens up to the arm's first statement.
    ///
    /// The condition ends at the first statement-opener keyword at
    /// parenthesis depth zero, so `IF EXISTS (SELECT …)` keeps its subquery.
    fn parse_condition(&mut self) -> String {
        self.cursor.skip_trivia();
        let start_pos = self.cursor.pos();
        let mut last_sig = start_pos;
        let mut depth: i32 = 0;

        while let Some(token) = self.cursor.current() {
            match token {
                Token::Whitespace(_) => {
                    self.cursor.bump();
                    continue;
                }
                Token::LParen => depth += 1,
                Token::RParen => depth = (depth - 1).max(0),
                Token::SemiColon if depth == 0 => break,
                Token::Word(w) if depth == 0 => {
                    if Self::is_arm_opener(w.keyword, &w.value)
                        || w.keyword == Keyword::END
                        || w.keyword == Keyword::ELSE
                    {
                        break;
                    }
                }
                _ => {}
            }
            last_sig = self.cursor.pos();
            self.cursor.bump();
        }

        if last_sig < start_pos || self.cursor.pos() == start_pos {
            return String::new();
        }
        self.snippet(start_pos, last_sig)
    }

    fn is_arm_opener(keyword: Keyword, value: &str) -> bool {
        matches!(
            keyword,
            Keyword::BEGIN
                | Keyword::SELECT
                | Keyword::INSERT
                | Keyword::UPDATE
                | Keyword::DELETE
                | Keyword::MERGE
                | Keyword::SET
                | Keyword::DECLARE
                | Keyword::RETURN
                | Keyword::IF
                | Keyword::COMMIT
                | Keyword::ROLLBACK
        ) || WORD_OPENERS.iter().any(|w| value.eq_ignore_ascii_case(w))
    }

    /// Parse a control-construct arm: either a `BEGIN … END` block's
    /// contents or a single statement.
    fn parse_arm(&mut self) -> Vec<ProcStatement> {
        self.cursor.skip_trivia();

        if self.cursor.at_keyword(Keyword::BEGIN) {
            // BEGIN TRAN / BEGIN TRY are statements, not block arms
            let is_block = self
                .word_after_current()
                .map(|w| {
                    !w.eq_ignore_ascii_case("TRAN")
                        && !w.eq_ignore_ascii_case("TRANSACTION")
                        && !w.eq_ignore_ascii_case("TRY")
                })
                .unwrap_or(true);
            if is_block {
                self.cursor.bump(); // BEGIN
                let body = self.parse_statements();
                self.cursor.eat_keyword(Keyword::END);
                return body;
            }
        }

        if self.cursor.is_done()
            || self.cursor.at_keyword(Keyword::END)
            || self.cursor.at_keyword(Keyword::ELSE)
        {
            // Empty arm (malformed input) degrades to nothing
            return Vec::new();
        }

        vec![self.parse_statement()]
    }

    fn parse_block(&mut self) -> ProcStatement {
        let start_line = self.current_line();
        self.cursor.eat_keyword(Keyword::BEGIN);
        let body = self.parse_statements();
        self.cursor.eat_keyword(Keyword::END);

        ProcStatement::Block {
            body,
            start_line,
            end_line: self.last_consumed_line(),
        }
    }

    fn parse_try_catch(&mut self) -> ProcStatement {
        let start_line = self.current_line();
        self.cursor.eat_keyword(Keyword::BEGIN);
        self.cursor.eat_word("TRY");

        let try_body = self.parse_statements();
        self.cursor.eat_keyword(Keyword::END);
        self.cursor.eat_word("TRY");

        let mut catch_body = Vec::new();
        if self.cursor.eat_keyword(Keyword::BEGIN) {
            self.cursor.eat_word("CATCH");
            catch_body = self.parse_statements();
            self.cursor.eat_keyword(Keyword::END);
            self.cursor.eat_word("CATCH");
        }

        ProcStatement::TryCatch {
            try_body,
            catch_body,
            start_line,
            end_line: self.last_consumed_line(),
        }
    }

    fn parse_leaf(&mut self) -> ProcStatement {
        self.cursor.skip_trivia();
        let start_pos = self.cursor.pos();
        let start_line = self.current_line();

        let mut kind = self.classify_opener();
        let is_cte = self.cursor.at_keyword(Keyword::WITH);

        let mut depth: i32 = 0;
        let mut last_sig = start_pos;
        let mut consumed_any = false;
        let mut insert_saw_select = false;
        let mut exec_operand_checked = false;

        while let Some(token) = self.cursor.current() {
            match token {
                Token::Whitespace(_) => {
                    self.cursor.bump();
                    continue;
                }
                Token::LParen => {
                    if consumed_any && kind == LeafKind::Exec && !exec_operand_checked {
                        // EXEC ('…') executes a string expression
                        kind = LeafKind::DynamicSql;
                        exec_operand_checked = true;
                    }
                    depth += 1;
                }
                Token::RParen => depth = (depth - 1).max(0),
                Token::SemiColon if depth == 0 => {
                    self.cursor.bump();
                    break;
                }
                Token::Word(w) if depth == 0 && consumed_any => {
                    if w.keyword == Keyword::END || w.keyword == Keyword::ELSE {
                        break;
                    }
                    if kind == LeafKind::Exec && !exec_operand_checked {
                        if w.value.starts_with('@') {
                            kind = LeafKind::DynamicSql;
                        }
                        exec_operand_checked = true;
                    } else if is_cte && kind == LeafKind::Other {
                        // First depth-0 DML keyword classifies the CTE statement
                        match w.keyword {
                            Keyword::SELECT => kind = LeafKind::Select,
                            Keyword::INSERT => kind = LeafKind::Insert,
                            Keyword::UPDATE => kind = LeafKind::Update,
                            Keyword::DELETE => kind = LeafKind::Delete,
                            Keyword::MERGE => kind = LeafKind::Merge,
                            _ => {}
                        }
                    } else if self.is_leaf_breaker(w.keyword, &w.value, kind, insert_saw_select) {
                        break;
                    }
                    // After SELECT or VALUES, a later depth-0 SELECT starts a
                    // new statement
                    if kind == LeafKind::Insert
                        && matches!(w.keyword, Keyword::SELECT | Keyword::VALUES)
                    {
                        insert_saw_select = true;
                    }
                }
                _ => {}
            }
            last_sig = self.cursor.pos();
            consumed_any = true;
            self.cursor.bump();
        }

        let mut sql = self.snippet(start_pos, last_sig);
        if sql.ends_with(';') {
            sql.pop();
            sql = sql.trim_end().to_string();
        }

        if crate::util::contains_ci(&sql, "sp_executesql") {
            kind = LeafKind::DynamicSql;
        }

        let end_line = self
            .cursor
            .tokens()
            .get(last_sig)
            .map(|t| t.span.end.line)
            .unwrap_or(start_line);

        ProcStatement::Leaf {
            kind,
            sql,
            start_line,
            end_line,
        }
    }

    fn classify_opener(&self) -> LeafKind {
        let Some(Token::Word(w)) = self.cursor.current() else {
            return LeafKind::Other;
        };
        match w.keyword {
            Keyword::SELECT => LeafKind::Select,
            Keyword::INSERT => LeafKind::Insert,
            Keyword::UPDATE => LeafKind::Update,
            Keyword::DELETE => LeafKind::Delete,
            Keyword::MERGE => LeafKind::Merge,
            Keyword::DECLARE => LeafKind::Declare,
            Keyword::SET => LeafKind::Set,
            Keyword::RETURN => LeafKind::Return,
            Keyword::COMMIT | Keyword::ROLLBACK => LeafKind::Transaction,
            Keyword::BEGIN => LeafKind::Transaction, // only reached for BEGIN TRAN
            _ => {
                if w.value.eq_ignore_ascii_case("EXEC") || w.value.eq_ignore_ascii_case("EXECUTE")
                {
                    LeafKind::Exec
                } else if w.value.eq_ignore_ascii_case("PRINT") {
                    LeafKind::Print
                } else if w.value.eq_ignore_ascii_case("RAISERROR") {
                    LeafKind::Raiserror
                } else {
                    LeafKind::Other
                }
            }
        }
    }

    /// Does this depth-0 word open the *next* statement?
    fn is_leaf_breaker(
        &self,
        keyword: Keyword,
        value: &str,
        kind: LeafKind,
        insert_saw_select: bool,
    ) -> bool {
        // MERGE bodies legitimately contain INSERT/UPDATE/DELETE/SET at
        // depth 0 (WHEN MATCHED THEN …); the required terminating semicolon
        // ends them instead.
        if kind == LeafKind::Merge {
            return value.eq_ignore_ascii_case("WHILE")
                || matches!(
                    keyword,
                    Keyword::IF | Keyword::DECLARE | Keyword::RETURN | Keyword::BEGIN
                );
        }

        match keyword {
            Keyword::IF
            | Keyword::DECLARE
            | Keyword::RETURN
            | Keyword::COMMIT
            | Keyword::ROLLBACK
            | Keyword::BEGIN
            | Keyword::MERGE
            | Keyword::INSERT
            | Keyword::DELETE
            | Keyword::UPDATE => true,
            Keyword::SELECT => {
                if kind == LeafKind::Insert && !insert_saw_select {
                    // INSERT … SELECT continuation
                    return false;
                }
                // UNION SELECT and similar set operators continue the statement
                !matches!(
                    self.prev_significant_keyword(),
                    Some(Keyword::UNION)
                        | Some(Keyword::ALL)
                        | Some(Keyword::EXCEPT)
                        | Some(Keyword::INTERSECT)
                        | Some(Keyword::AS)
                )
            }
            Keyword::SET => kind != LeafKind::Update,
            _ => WORD_OPENERS.iter().any(|w| value.eq_ignore_ascii_case(w)),
        }
    }

    fn prev_significant_keyword(&self) -> Option<Keyword> {
        let tokens = self.cursor.tokens();
        tokens[..self.cursor.pos()]
            .iter()
            .rev()
            .find(|t| !matches!(t.token, Token::Whitespace(_)))
            .and_then(|t| match &t.token {
                Token::Word(w) => Some(w.keyword),
                _ => None,
            })
    }
}

/// Convenience wrapper used by tests: parse a standalone body string.
#[cfg(test)]
pub fn parse_body_text(source: &str) -> Vec<ProcStatement> {
    let mut cursor = TokenCursor::tokenize(source).expect("tokenize");
    let line_index = LineIndex::new(source);
    parse_body_statements(source, &line_index, &mut cursor).expect("parse")
}
