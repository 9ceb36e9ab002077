//! Query dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction over the differences
//! between JPQL-family query languages. Each dialect implements
//! `QueryDialect` to handle its specific syntax:
//!
//! - Boolean literals: `TRUE`/`FALSE` vs `true`/`false`
//! - String concatenation: `CONCAT(a, b)` vs `a || b`
//! - Parameter markers: `:name`
//!
//! # Usage
//!
//! ```ignore
//! use querystream::sql::dialect::{Dialect, QueryDialect};
//!
//! let dialect = Dialect::Jpql;
//! let quoted = dialect.quote_string("O'Brien");  // 'O''Brien'
//! ```

mod hql;
mod jpql;

pub use hql::Hql;
pub use jpql::Jpql;

use serde::{Deserialize, Serialize};

/// Query dialect trait - defines how constructs are rendered.
///
/// The default implementations follow JPQL.
pub trait QueryDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    /// Quote a string literal.
    ///
    /// Single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a named parameter marker.
    fn format_parameter(&self, name: &str) -> String {
        format!(":{}", name)
    }

    /// String concatenation operator.
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Whether this dialect supports the concat operator. Dialects that do
    /// not get `CONCAT(a, b)` instead.
    fn supports_concat_operator(&self) -> bool {
        true
    }
}

/// Supported query dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Jpql,
    Hql,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn QueryDialect {
        match self {
            Dialect::Jpql => &Jpql,
            Dialect::Hql => &Hql,
        }
    }
}

// Implement QueryDialect for Dialect enum by delegating to concrete types
impl QueryDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_parameter(&self, name: &str) -> String {
        self.dialect().format_parameter(name)
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpql" => Ok(Dialect::Jpql),
            "hql" => Ok(Dialect::Hql),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}
