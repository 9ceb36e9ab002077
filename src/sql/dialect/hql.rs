//! Hibernate Query Language.
//!
//! A JPQL superset:
//! - Lower-case boolean literals
//! - `||` string concatenation

use super::QueryDialect;

/// HQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Hql;

impl QueryDialect for Hql {
    fn name(&self) -> &'static str {
        "hql"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        if b {
            "true"
        } else {
            "false"
        }
    }
}
