//! Query text generation.
//!
//! This module turns a [`QueryModel`] into dialect-specific query text.
//! It includes:
//!
//! - [`expr`] - Expression IR and builder DSL
//! - [`query`] - The immutable query model and its merge operations
//! - [`emit`] - Text emission, aliases and parenthesization
//! - [`token`] - Token types for query generation
//! - [`dialect`] - JPQL and HQL dialects
//! - [`validate`] - Syntax checking of emitted text

pub mod dialect;
pub mod emit;
pub mod expr;
pub mod query;
pub mod token;
pub mod validate;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, QueryDialect};
pub use emit::{aliases, to_text};
pub use expr::{
    lit_bool, lit_float, lit_int, lit_null, lit_str, param, AggregateKind, BinaryOperator, Expr,
    ExprExt, Literal, ScalarFunction, SemType, SourceId, TupleShape, UnaryOperator,
};
pub use query::{
    Hints, MergeError, OrderKey, QueryModel, SortDir, SourceOrigin, Window, AUTOMATIC_PAGE_SIZE,
    EXCEPTION_ON_TRANSLATION_FAIL,
};
pub use token::{Token, TokenStream};
pub use validate::{check_syntax, SyntaxError};
