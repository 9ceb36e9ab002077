//! Executor error types.

use thiserror::Error;

use crate::sql::validate::SyntaxError;

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors reported by a query executor. Surfaced to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// No execution handle could be acquired.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// The handle was never issued or is already released.
    #[error("unknown execution handle {0}")]
    UnknownHandle(u64),

    /// The engine refused the query.
    #[error("query rejected: {reason}")]
    Rejected {
        /// Query text as sent.
        query: String,
        /// Engine message.
        reason: String,
    },

    /// The in-memory executor has nothing scripted for this text.
    #[error("no result scripted for query: {0}")]
    NoResponse(String),

    /// The query text does not parse.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl ExecutorError {
    /// Create a rejection for a query.
    pub fn rejected(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            query: query.into(),
            reason: reason.into(),
        }
    }
}
