//! Token cursor over the MsSqlDialect token stream.
//!
//! `TokenCursor` carries exactly the probe set the header and body parsers
//! need. Two layers:
//!
//! - `at_*` / `current` test the token at the cursor without touching
//!   whitespace, for the scanning loops that account for every token
//!   (snippet extraction needs the raw positions).
//! - `eat_*` fuse trivia-skip, test and consume into one bool-returning
//!   call, for the structural grammar (`eat_keyword(Keyword::BEGIN)`,
//!   `eat_word("TRY")`). T-SQL words sqlparser does not classify as
//!   keywords ("PROC", "TRY", "CATCH", "TRAN") go through the `_word`
//!   variants.
//!
//! Positions index the token vector; `pos`/`rewind` give the header parser
//! its backtracking, and the `*_significant` probes let the body parser
//! look ahead without consuming.

use sqlparser::dialect::MsSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer};

/// Cursor over a tokenized T-SQL text.
pub struct TokenCursor {
    tokens: Vec<TokenWithSpan>,
    pos: usize,
}

impl TokenCursor {
    /// Tokenize with MsSqlDialect. `None` when tokenization fails.
    pub fn tokenize(sql: &str) -> Option<Self> {
        let dialect = MsSqlDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize_with_location()
            .ok()?;
        Some(Self { tokens, pos: 0 })
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Back the cursor up to a previously saved position.
    #[inline]
    pub fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn tokens(&self) -> &[TokenWithSpan] {
        &self.tokens
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// The token at the cursor, without its span.
    #[inline]
    pub fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Consume one token.
    #[inline]
    pub fn bump(&mut self) {
        if !self.is_done() {
            self.pos += 1;
        }
    }

    /// Consume whitespace and comments.
    pub fn skip_trivia(&mut self) {
        while matches!(self.current(), Some(Token::Whitespace(_))) {
            self.bump();
        }
    }

    // ------------------------------------------------------------------
    // Raw probes: test the token at the cursor, consume nothing
    // ------------------------------------------------------------------

    #[inline]
    pub fn at_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.current(), Some(Token::Word(w)) if w.keyword == keyword)
    }

    #[inline]
    pub fn at_word(&self, word: &str) -> bool {
        matches!(self.current(), Some(Token::Word(w)) if w.value.eq_ignore_ascii_case(word))
    }

    /// Token-type test by discriminant (punctuation, literals).
    #[inline]
    pub fn at_punct(&self, expected: &Token) -> bool {
        match self.current() {
            Some(token) => std::mem::discriminant(token) == std::mem::discriminant(expected),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Eating probes: skip trivia, then test-and-consume
    // ------------------------------------------------------------------

    pub fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.skip_trivia();
        if self.at_keyword(keyword) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn eat_word(&mut self, word: &str) -> bool {
        self.skip_trivia();
        if self.at_word(word) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn eat_punct(&mut self, expected: &Token) -> bool {
        self.skip_trivia();
        if self.at_punct(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Lookahead
    // ------------------------------------------------------------------

    /// Index of the first non-trivia token at or after `pos`.
    pub fn next_significant(&self, pos: usize) -> Option<usize> {
        self.tokens
            .get(pos..)
            .and_then(|rest| {
                rest.iter()
                    .position(|t| !matches!(t.token, Token::Whitespace(_)))
            })
            .map(|rel| pos + rel)
    }

    /// First non-trivia token from the cursor, not consumed.
    pub fn peek_significant(&self) -> Option<&TokenWithSpan> {
        self.next_significant(self.pos).map(|i| &self.tokens[i])
    }

    // ------------------------------------------------------------------
    // Name reads
    // ------------------------------------------------------------------

    /// Read one identifier word (the MsSql tokenizer strips brackets).
    pub fn identifier(&mut self) -> Option<String> {
        self.skip_trivia();
        match self.current()? {
            Token::Word(w) => {
                let value = w.value.clone();
                self.bump();
                Some(value)
            }
            _ => None,
        }
    }

    /// Read `[schema].[name]`, `schema.name` or bare `name`; a missing
    /// schema defaults to `dbo`.
    pub fn qualified_name(&mut self) -> Option<(String, String)> {
        let first = self.identifier()?;
        if self.eat_punct(&Token::Period) {
            let second = self.identifier()?;
            Some((first, second))
        } else {
            Some(("dbo".to_string(), first))
        }
    }
}

/// Render a single token back to display text. Covers the token shapes
/// that appear in data types and default values; the rest fall through to
/// the tokenizer's display form.
pub fn token_text(token: &Token) -> String {
    match token {
        Token::Word(w) => w.value.clone(),
        Token::Number(n, _) => n.clone(),
        Token::SingleQuotedString(s) => format!("'{}'", s),
        Token::NationalStringLiteral(s) => format!("N'{}'", s),
        Token::LParen => "(".to_string(),
        Token::RParen => ")".to_string(),
        Token::Comma => ",".to_string(),
        Token::Period => ".".to_string(),
        Token::SemiColon => ";".to_string(),
        Token::Plus => "+".to_string(),
        Token::Minus => "-".to_string(),
        Token::Mul => "*".to_string(),
        Token::Div => "/".to_string(),
        Token::Mod => "%".to_string(),
        Token::Eq => "=".to_string(),
        Token::Neq => "<>".to_string(),
        Token::Lt => "<".to_string(),
        Token::Gt => ">".to_string(),
        Token::LtEq => "<=".to_string(),
        Token::GtEq => ">=".to_string(),
        Token::Whitespace(ws) => ws.to_string(),
        other => format!("{}", other),
    }
}

/// Maps sqlparser `Location`s (1-based line/column) to byte offsets in the
/// original source, for verbatim snippet extraction.
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Byte offset of a 1-based (line, column) location. Columns count
    /// characters, matching the tokenizer.
    pub fn offset(&self, source: &str, line: u64, column: u64) -> usize {
        let line_idx = (line.max(1) as usize - 1).min(self.line_starts.len() - 1);
        let start = self.line_starts[line_idx];
        let mut remaining = column.max(1) - 1;
        for (i, ch) in source[start..].char_indices() {
            if remaining == 0 || ch == '\n' {
                return start + i;
            }
            remaining -= 1;
        }
        source.len()
    }
}
