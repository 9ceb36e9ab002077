//! Error types for translation and query execution.

use std::fmt;

use crate::executor::ExecutorError;
use crate::lambda::EvalError;
use crate::value::FromValueError;

/// The pipeline clause a translation problem belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    Where,
    Join,
    Sort,
    Distinct,
    Window,
    Aggregate,
}

impl Clause {
    pub fn name(self) -> &'static str {
        match self {
            Clause::Select => "select",
            Clause::Where => "where",
            Clause::Join => "join",
            Clause::Sort => "sorted_by",
            Clause::Distinct => "distinct",
            Clause::Window => "skip/limit",
            Clause::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A clause could not be turned into query text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslationError {
    #[error("Extraction failure in {clause}: {reason}")]
    ExtractionFailure { clause: Clause, reason: String },

    #[error("Unsupported construct in {clause}: {reason}")]
    UnsupportedConstruct { clause: Clause, reason: String },

    #[error("Parameter :{name} is bound to two different values")]
    ParameterConflict { name: String },

    #[error("Query model is not translatable: {reason}")]
    InvalidModel { reason: String },
}

impl TranslationError {
    pub fn clause(&self) -> Option<Clause> {
        match self {
            TranslationError::ExtractionFailure { clause, .. }
            | TranslationError::UnsupportedConstruct { clause, .. } => Some(*clause),
            TranslationError::ParameterConflict { .. } | TranslationError::InvalidModel { .. } => {
                None
            }
        }
    }
}

/// Errors surfaced by terminal stream operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Translation failed: {0}")]
    Translation(#[from] TranslationError),

    #[error("Invalid hint {name}: {reason}")]
    InvalidHint { name: String, reason: String },

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Fallback evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Row has {found} columns, expected {expected}")]
    RowShape { expected: usize, found: usize },

    #[error("Expected exactly one value, found {0}")]
    NotSingleValue(usize),

    #[error("Result conversion failed: {0}")]
    Conversion(#[from] FromValueError),
}

pub type QueryResult<T> = Result<T, QueryError>;
