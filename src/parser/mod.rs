//! T-SQL parsing

mod body_parser;
mod procedure_parser;
mod tokens;

pub use body_parser::{parse_body_statements, LeafKind, ProcStatement};
pub use procedure_parser::{parse_procedure_header, ProcedureHeader};
pub use tokens::{token_text, LineIndex, TokenCursor};

#[cfg(test)]
pub use body_parser::parse_body_text;

use crate::error::ProcSimError;

/// The result of parsing one procedure text: an optional header (absent in
/// batch mode) and the body statements.
pub struct ParsedSource {
    pub header: Option<ProcedureHeader>,
    pub statements: Vec<ProcStatement>,
}

/// Parse procedure text into header and body AST.
pub fn parse_source(source: &str) -> Result<ParsedSource, ProcSimError> {
    let mut cursor = TokenCursor::tokenize(source)
        .ok_or_else(|| ProcSimError::bad_input("could not tokenize procedure text"))?;
    let line_index = LineIndex::new(source);

    let header = parse_procedure_header(&mut cursor);
    let statements = parse_body_statements(source, &line_index, &mut cursor)?;

    Ok(ParsedSource { header, statements })
}
