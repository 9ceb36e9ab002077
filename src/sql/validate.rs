//! Syntax checking of emitted query text.
//!
//! JPQL is close enough to SQL for sqlparser's generic dialect to catch
//! unbalanced parentheses, dangling operators and malformed clauses. Entity
//! and attribute names are not checked here; see [`crate::metamodel`].

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Emitted text that does not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed query text: {message}\n  {text}")]
pub struct SyntaxError {
    pub message: String,
    pub text: String,
}

/// Parse `text` as a single SELECT statement.
pub fn check_syntax(text: &str) -> Result<(), SyntaxError> {
    let statements = Parser::parse_sql(&GenericDialect {}, text).map_err(|e| SyntaxError {
        message: e.to_string(),
        text: text.into(),
    })?;
    match statements.as_slice() {
        [sqlparser::ast::Statement::Query(_)] => Ok(()),
        _ => Err(SyntaxError {
            message: "expected exactly one SELECT statement".into(),
            text: text.into(),
        }),
    }
}
