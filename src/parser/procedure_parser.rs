//! Procedure header parsing for T-SQL.
//!
//! Token-based parsing of `CREATE [OR ALTER] PROCEDURE` / `ALTER PROCEDURE`
//! headers with full parameter extraction.
//!
//! ## Supported Syntax
//!
//! ```sql
//! CREATE PROCEDURE [schema].[name] AS ...
//! CREATE PROC name @p1 TYPE, @p2 TYPE OUTPUT AS ...
//! CREATE OR ALTER PROCEDURE name (@p1 INT = 5) AS ...
//! ALTER PROCEDURE name @q NVARCHAR(100) = 'x' AS ...
//! ```
//!
//! On success the token stream is positioned just past the `AS` keyword, so
//! the body parser can continue from there against the same source text.

use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::Token;

use crate::params::ProcParameter;

use super::tokens::{token_text, TokenCursor};

/// A parsed procedure header
#[derive(Debug, Clone)]
pub struct ProcedureHeader {
    /// Schema name (defaults to "dbo" if not specified)
    pub schema: String,
    /// Procedure name
    pub name: String,
    /// Declared parameters, in declaration order
    pub parameters: Vec<ProcParameter>,
}

/// Try to parse a procedure header at the current position.
///
/// Returns `None` (with the position restored) when the text does not start
/// with a CREATE/ALTER PROCEDURE wrapper; the caller then treats the whole
/// input as a batch body.
pub fn parse_procedure_header(cursor: &mut TokenCursor) -> Option<ProcedureHeader> {
    let saved = cursor.pos();
    match try_parse_header(cursor) {
        Some(header) => Some(header),
        None => {
            cursor.rewind(saved);
            None
        }
    }
}

fn try_parse_header(cursor: &mut TokenCursor) -> Option<ProcedureHeader> {
    if cursor.eat_keyword(Keyword::CREATE) {
        // Optional OR ALTER
        if cursor.eat_keyword(Keyword::OR) && !cursor.eat_keyword(Keyword::ALTER) {
            return None;
        }
    } else if !cursor.eat_keyword(Keyword::ALTER) {
        return None;
    }

    if !cursor.eat_keyword(Keyword::PROCEDURE) && !cursor.eat_word("PROC") {
        return None;
    }

    cursor.skip_trivia();
    let (schema, name) = cursor.qualified_name()?;

    let parameters = parse_parameters(cursor);

    // Parameters end at AS; consume it so the caller is at the body
    if !cursor.eat_keyword(Keyword::AS) {
        return None;
    }

    Some(ProcedureHeader {
        schema,
        name,
        parameters,
    })
}

/// Parse parameters between the procedure name and the AS keyword.
/// They may or may not be wrapped in parentheses.
fn parse_parameters(cursor: &mut TokenCursor) -> Vec<ProcParameter> {
    let mut params = Vec::new();

    let has_parens = cursor.eat_punct(&Token::LParen);

    loop {
        cursor.skip_trivia();
        if cursor.is_done() || cursor.at_keyword(Keyword::AS) {
            break;
        }
        if has_parens && cursor.eat_punct(&Token::RParen) {
            break;
        }

        if let Some(param) = parse_single_parameter(cursor) {
            params.push(param);
        } else {
            cursor.skip_trivia();
            if cursor.at_keyword(Keyword::AS) {
                break;
            }
            // Not a parameter and not a separator: skip the stray token
            if !cursor.eat_punct(&Token::Comma) {
                cursor.bump();
            }
        }

        // Separator before the next parameter
        cursor.eat_punct(&Token::Comma);
    }

    params
}

/// Parse a single parameter: `@name TYPE [= default] [READONLY] [OUTPUT|OUT]`
fn parse_single_parameter(cursor: &mut TokenCursor) -> Option<ProcParameter> {
    let name = parse_parameter_name(cursor)?;
    let sql_type = parse_data_type(cursor)?;

    // Modifiers appear in any order; loop until a delimiter
    let mut default_value = None;
    let mut is_output = false;

    loop {
        if cursor.eat_punct(&Token::Eq) {
            cursor.skip_trivia();
            default_value = Some(parse_default_value(cursor));
            continue;
        }
        // READONLY applies to table-valued parameters; consume and move on
        if cursor.eat_word("READONLY") {
            continue;
        }
        // OUTPUT is not a Keyword variant, use the word probe
        if cursor.eat_word("OUTPUT") || cursor.eat_word("OUT") {
            is_output = true;
            continue;
        }
        break;
    }

    Some(ProcParameter {
        name,
        sql_type,
        is_output,
        has_default: default_value.is_some(),
        default_value,
    })
}

/// Parse a parameter name, keeping the `@` prefix.
fn parse_parameter_name(cursor: &mut TokenCursor) -> Option<String> {
    cursor.skip_trivia();
    match cursor.current()? {
        // MsSqlDialect tokenizes @name as a single Word
        Token::Word(w) if w.value.starts_with('@') => {
            let name = w.value.clone();
            cursor.bump();
            Some(name)
        }
        _ => None,
    }
}

/// Parse a data type (e.g. INT, DECIMAL(18,2), NVARCHAR(100), dbo.TableType).
fn parse_data_type(cursor: &mut TokenCursor) -> Option<String> {
    let first_part = type_identifier(cursor)?;

    let mut result = if cursor.eat_punct(&Token::Period) {
        match type_identifier(cursor) {
            Some(second_part) => format!("{}.{}", first_part, second_part),
            None => first_part,
        }
    } else {
        first_part.to_uppercase()
    };

    // Type parameters: (n), (p, s), (MAX)
    if cursor.eat_punct(&Token::LParen) {
        result.push('(');
        let mut depth = 1;
        while depth > 0 {
            let Some(token) = cursor.current() else {
                break;
            };
            match token {
                Token::LParen => {
                    depth += 1;
                    result.push('(');
                }
                Token::RParen => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(')');
                    }
                }
                Token::Whitespace(_) => {}
                other => result.push_str(&token_text(other)),
            }
            cursor.bump();
        }
        result.push(')');
    }

    Some(result)
}

/// Read an identifier usable as a type name, refusing delimiter words.
fn type_identifier(cursor: &mut TokenCursor) -> Option<String> {
    cursor.skip_trivia();
    match cursor.current()? {
        Token::Word(w) => {
            if matches!(w.keyword, Keyword::AS | Keyword::BEGIN | Keyword::WITH)
                || ["READONLY", "OUTPUT", "OUT"]
                    .iter()
                    .any(|m| w.value.eq_ignore_ascii_case(m))
            {
                return None;
            }
            let name = w.value.clone();
            cursor.bump();
            Some(name)
        }
        _ => None,
    }
}

/// Parse a default value: everything up to a comma, READONLY, OUTPUT, OUT,
/// AS, or the closing paren of the parameter list.
fn parse_default_value(cursor: &mut TokenCursor) -> String {
    let mut value = String::new();
    let mut depth = 0i32;

    while let Some(token) = cursor.current() {
        match token {
            Token::LParen => {
                depth += 1;
                value.push('(');
            }
            Token::RParen if depth == 0 => break,
            Token::RParen => {
                depth -= 1;
                value.push(')');
            }
            Token::Comma if depth == 0 => break,
            Token::Word(w)
                if depth == 0
                    && (w.keyword == Keyword::AS
                        || ["OUTPUT", "OUT", "READONLY"]
                            .iter()
                            .any(|m| w.value.eq_ignore_ascii_case(m))) =>
            {
                break;
            }
            Token::Whitespace(_) => {
                if !value.is_empty() && !value.ends_with(' ') {
                    value.push(' ');
                }
            }
            other => value.push_str(&token_text(other)),
        }
        cursor.bump();
    }

    value.trim().to_string()
}
