//! End-to-end compilation from a query model to executable text.
//!
//! ```text
//! QueryModel → validate → emit → CompiledQuery { text, params, window, shape, fingerprint }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use querystream::compile::compile;
//! use querystream::sql::{Dialect, QueryModel};
//!
//! let compiled = compile(&QueryModel::root("Customer"), Dialect::Jpql)?;
//! assert_eq!(compiled.text, "SELECT A FROM Customer A");
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::TranslationError;
use crate::interp::rewrite::parameters;
use crate::sql::emit;
use crate::sql::expr::TupleShape;
use crate::sql::query::{QueryModel, Window};
use crate::sql::Dialect;
use crate::value::Value;

// ============================================================================
// Result Types
// ============================================================================

/// Query text ready for an executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// The generated query string.
    pub text: String,

    /// Values for the `:name` parameters in `text`.
    pub params: BTreeMap<String, Value>,

    /// Rows to skip and return; applied by the executor, not in `text`.
    pub window: Window,

    /// Nesting of the projected columns, for rebuilding tuples from rows.
    pub shape: TupleShape,

    /// The dialect used for generation.
    pub dialect: Dialect,

    /// SHA-256 over text, parameters and window.
    pub fingerprint: String,
}

impl CompiledQuery {
    /// Number of columns each result row carries.
    pub fn width(&self) -> usize {
        self.shape.width()
    }
}

// ============================================================================
// Compilation Functions
// ============================================================================

/// Compile a query model to text in the given dialect.
pub fn compile(model: &QueryModel, dialect: Dialect) -> Result<CompiledQuery, TranslationError> {
    // Step 1: Reject models with unsupported nodes or dangling sources
    model
        .validate()
        .map_err(|e| TranslationError::InvalidModel {
            reason: e.to_string(),
        })?;

    // Step 2: Collect parameters
    let params = collect_parameters(model)?;

    // Step 3: Generate text
    let text = emit::to_text(model, dialect);

    let window = model.window();
    let fingerprint = compute_hash(&(&text, &params, window)).map_err(|e| {
        TranslationError::InvalidModel {
            reason: format!("cannot fingerprint query: {}", e),
        }
    })?;

    tracing::debug!(%fingerprint, %dialect, text = %text, "compiled query");

    Ok(CompiledQuery {
        text,
        params,
        window,
        shape: model.row_shape(),
        dialect,
        fingerprint,
    })
}

/// Parameters in predicate, projection and ordering. A name may repeat only
/// with the same value.
fn collect_parameters(model: &QueryModel) -> Result<BTreeMap<String, Value>, TranslationError> {
    let exprs = model
        .predicate()
        .into_iter()
        .chain(model.projection())
        .chain(model.ordering().iter().map(|k| &k.expr));

    let mut params = BTreeMap::new();
    for expr in exprs {
        for (name, value) in parameters(expr) {
            match params.get(name) {
                Some(existing) if existing != value => {
                    return Err(TranslationError::ParameterConflict { name: name.into() });
                }
                Some(_) => {}
                None => {
                    params.insert(name.to_string(), value.clone());
                }
            }
        }
    }
    Ok(params)
}

/// SHA-256 of the JSON form of a value, as lowercase hex.
fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Tests
// ============================================================================
