//! Jakarta Persistence Query Language.
//!
//! - Upper-case boolean literals
//! - No `||` operator; concatenation is `CONCAT(a, b)`

use super::QueryDialect;

/// JPQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Jpql;

impl QueryDialect for Jpql {
    fn name(&self) -> &'static str {
        "jpql"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        if b {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn supports_concat_operator(&self) -> bool {
        false
    }
}
