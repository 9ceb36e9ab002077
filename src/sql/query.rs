//! Query model - the composable, immutable description of one query.
//!
//! Every merge operation borrows the current model and returns a new one, so a
//! model shared between streams is never changed underneath them.
//!
//! ```ignore
//! let model = QueryModel::root("Customer")
//!     .select(debt_and_name)?
//!     .filter(debt_over_250)?;
//! ```

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use super::expr::{and_all, AggregateKind, Expr, SemType, SourceId, TupleShape};
use crate::error::QueryError;
use crate::interp::rewrite::{first_unsupported, referenced_sources};
use crate::interp::JoinRequest;
use crate::value::Value;

// =============================================================================
// Sources
// =============================================================================

/// Where a FROM-clause source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceOrigin {
    /// `<Entity> <alias>`
    Root { entity: String },
    /// `<parentAlias>.<path> <alias>`
    Path {
        parent: SourceId,
        path: Vec<String>,
        entity: String,
    },
}

impl SourceOrigin {
    pub fn entity(&self) -> &str {
        match self {
            SourceOrigin::Root { entity } | SourceOrigin::Path { entity, .. } => entity,
        }
    }
}

// =============================================================================
// Ordering and windows
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub expr: Expr,
    pub dir: SortDir,
}

/// Rows to skip and keep, applied by the executor rather than emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Window {
    pub skip: u64,
    pub limit: Option<u64>,
}

impl Window {
    pub fn is_unbounded(&self) -> bool {
        self.skip == 0 && self.limit.is_none()
    }

    /// Drop `n` more rows from the front.
    pub fn skip(self, n: u64) -> Window {
        Window {
            skip: self.skip.saturating_add(n),
            limit: self.limit.map(|l| l.saturating_sub(n)),
        }
    }

    /// Keep at most `n` rows.
    pub fn limit(self, n: u64) -> Window {
        Window {
            skip: self.skip,
            limit: Some(self.limit.map_or(n, |l| l.min(n))),
        }
    }

    /// Sub-window of rows `[offset, offset + len)` inside this window.
    pub fn page(self, offset: u64, len: u64) -> Window {
        self.skip(offset).limit(len)
    }
}

// =============================================================================
// Hints
// =============================================================================

/// Rows fetched per executor round trip when paging.
pub const AUTOMATIC_PAGE_SIZE: &str = "automaticPageSize";
/// Whether untranslatable clauses fail the stream or run client-side.
pub const EXCEPTION_ON_TRANSLATION_FAIL: &str = "exceptionOnTranslationFail";

/// Execution hints attached to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hints {
    pub automatic_page_size: Option<NonZeroU64>,
    pub exception_on_translation_fail: bool,
}

impl Default for Hints {
    fn default() -> Self {
        Self {
            automatic_page_size: None,
            exception_on_translation_fail: true,
        }
    }
}

impl Hints {
    /// Set a hint by name.
    ///
    /// Unknown names and ill-typed or out-of-range values are rejected.
    pub fn set(self, name: &str, value: &Value) -> Result<Hints, QueryError> {
        let invalid = |reason: &str| QueryError::InvalidHint {
            name: name.into(),
            reason: reason.into(),
        };
        match name {
            AUTOMATIC_PAGE_SIZE => {
                let size = value
                    .as_int()
                    .and_then(|n| u64::try_from(n).ok())
                    .and_then(NonZeroU64::new)
                    .ok_or_else(|| invalid("must be a positive integer"))?;
                Ok(Hints {
                    automatic_page_size: Some(size),
                    ..self
                })
            }
            EXCEPTION_ON_TRANSLATION_FAIL => {
                let flag = value.as_bool().ok_or_else(|| invalid("must be a boolean"))?;
                Ok(Hints {
                    exception_on_translation_fail: flag,
                    ..self
                })
            }
            _ => Err(invalid("unrecognized hint")),
        }
    }
}

// =============================================================================
// Merge errors
// =============================================================================

/// Why a clause cannot be merged into a single flat query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error("{0} after skip/limit cannot be expressed in one query")]
    AfterWindow(&'static str),

    #[error("{0} after distinct cannot be expressed in one query")]
    AfterDistinct(&'static str),

    #[error("{clause} needs a {expected} expression, found {found:?}")]
    Type {
        clause: &'static str,
        expected: &'static str,
        found: SemType,
    },

    #[error("expression refers to source {0:?} which is not in the query")]
    DanglingSource(SourceId),

    #[error("{0}")]
    Unsupported(String),
}

// =============================================================================
// Query model
// =============================================================================

/// Sources, predicate, projection, ordering and hints of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryModel {
    sources: Vec<SourceOrigin>,
    predicate: Option<Expr>,
    projection: Option<Expr>,
    ordering: Vec<OrderKey>,
    distinct: bool,
    window: Window,
    hints: Hints,
}

impl QueryModel {
    /// A model over all instances of `entity`.
    pub fn root(entity: &str) -> Self {
        Self {
            sources: vec![SourceOrigin::Root {
                entity: entity.into(),
            }],
            predicate: None,
            projection: None,
            ordering: vec![],
            distinct: false,
            window: Window::default(),
            hints: Hints::default(),
        }
    }

    pub fn sources(&self) -> &[SourceOrigin] {
        &self.sources
    }

    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }

    pub fn projection(&self) -> Option<&Expr> {
        self.projection.as_ref()
    }

    pub fn ordering(&self) -> &[OrderKey] {
        &self.ordering
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn hints(&self) -> Hints {
        self.hints
    }

    /// Expression for the current stream element: the projection, or the
    /// sole source when nothing has been selected.
    pub fn element(&self) -> Expr {
        match &self.projection {
            Some(projection) => projection.clone(),
            None => Expr::SourceRef {
                source: SourceId(0),
                entity: self.sources[0].entity().to_string(),
            },
        }
    }

    /// Nesting of the result columns.
    pub fn row_shape(&self) -> TupleShape {
        match &self.projection {
            Some(Expr::Tuple { shape, .. }) => shape.clone(),
            _ => TupleShape::Leaf,
        }
    }

    fn ensure_source(&self, id: SourceId) -> Result<(), MergeError> {
        if id.0 < self.sources.len() {
            Ok(())
        } else {
            Err(MergeError::DanglingSource(id))
        }
    }

    fn ensure_translated(expr: &Expr) -> Result<(), MergeError> {
        match first_unsupported(expr) {
            Some(reason) => Err(MergeError::Unsupported(reason.to_string())),
            None => Ok(()),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<(), MergeError> {
        Self::ensure_translated(expr)?;
        referenced_sources(expr)
            .into_iter()
            .try_for_each(|id| self.ensure_source(id))
    }

    // -------------------------------------------------------------------------
    // Merge algebra
    // -------------------------------------------------------------------------

    /// Replace the projection.
    ///
    /// `expr` was interpreted against [`element`](Self::element), so chained
    /// selects fuse into one projection.
    pub fn select(&self, expr: Expr) -> Result<Self, MergeError> {
        if self.distinct {
            return Err(MergeError::AfterDistinct("select"));
        }
        self.check_expr(&expr)?;
        if let ty @ (SemType::Collection(_) | SemType::Unknown) = expr.ty() {
            if !matches!(expr, Expr::Parameter { .. } | Expr::Constant(_)) {
                return Err(MergeError::Type {
                    clause: "select",
                    expected: "single-valued",
                    found: ty,
                });
            }
        }
        Ok(Self {
            projection: Some(expr),
            ..self.clone()
        })
    }

    /// AND a predicate onto the filter; existing conjuncts stay on the left.
    pub fn filter(&self, predicate: Expr) -> Result<Self, MergeError> {
        if !self.window.is_unbounded() {
            return Err(MergeError::AfterWindow("where"));
        }
        self.check_expr(&predicate)?;
        match predicate.ty() {
            SemType::Boolean | SemType::Unknown => {}
            found => {
                return Err(MergeError::Type {
                    clause: "where",
                    expected: "boolean",
                    found,
                })
            }
        }
        Ok(Self {
            predicate: and_all(self.predicate.clone().into_iter().chain([predicate])),
            ..self.clone()
        })
    }

    /// Append a source; the element becomes `(previous element, new source)`.
    pub fn join(&self, request: JoinRequest) -> Result<Self, MergeError> {
        if !self.window.is_unbounded() {
            return Err(MergeError::AfterWindow("join"));
        }
        if self.distinct {
            return Err(MergeError::AfterDistinct("join"));
        }
        let origin = match request {
            JoinRequest::Path {
                parent,
                path,
                entity,
            } => {
                self.ensure_source(parent)?;
                SourceOrigin::Path {
                    parent,
                    path,
                    entity,
                }
            }
            JoinRequest::Root { entity } => SourceOrigin::Root { entity },
        };
        let id = SourceId(self.sources.len());
        let joined = Expr::SourceRef {
            source: id,
            entity: origin.entity().to_string(),
        };
        let projection = Expr::tuple(vec![self.element(), joined]);

        let mut sources = self.sources.clone();
        sources.push(origin);
        Ok(Self {
            sources,
            projection: Some(projection),
            ..self.clone()
        })
    }

    /// Add a sort key. The newest key becomes the primary one, as with
    /// repeated stable sorts.
    pub fn sort(&self, key: Expr, dir: SortDir) -> Result<Self, MergeError> {
        if !self.window.is_unbounded() {
            return Err(MergeError::AfterWindow("sorted_by"));
        }
        self.check_expr(&key)?;
        let ty = key.ty();
        if !(ty.is_scalar() || ty == SemType::Unknown) {
            return Err(MergeError::Type {
                clause: "sorted_by",
                expected: "scalar",
                found: ty,
            });
        }
        let mut ordering = Vec::with_capacity(self.ordering.len() + 1);
        ordering.push(OrderKey { expr: key, dir });
        ordering.extend(self.ordering.iter().cloned());
        Ok(Self {
            ordering,
            ..self.clone()
        })
    }

    pub fn distinct(&self) -> Result<Self, MergeError> {
        if !self.window.is_unbounded() {
            return Err(MergeError::AfterWindow("distinct"));
        }
        Ok(Self {
            distinct: true,
            ..self.clone()
        })
    }

    pub fn skip(&self, n: u64) -> Self {
        Self {
            window: self.window.skip(n),
            ..self.clone()
        }
    }

    pub fn limit(&self, n: u64) -> Self {
        Self {
            window: self.window.limit(n),
            ..self.clone()
        }
    }

    /// Replace the projection with a single aggregate.
    ///
    /// Without `arg`, a count counts rows (`COUNT(A)`), or distinct elements
    /// after `distinct`; other aggregates run over the current element.
    pub fn aggregate(&self, kind: AggregateKind, arg: Option<Expr>) -> Result<Self, MergeError> {
        if !self.window.is_unbounded() {
            return Err(MergeError::AfterWindow("aggregate"));
        }
        // DISTINCT applies to elements; an aggregate over a computed argument
        // would deduplicate the argument values instead.
        if self.distinct && arg.as_ref().is_some_and(|arg| *arg != self.element()) {
            return Err(MergeError::AfterDistinct("aggregate"));
        }
        let arg = match arg {
            Some(arg) => arg,
            // COUNT(expr) skips nulls; the first source is never null.
            None if kind == AggregateKind::Count && !self.distinct => Expr::SourceRef {
                source: SourceId(0),
                entity: self.sources[0].entity().to_string(),
            },
            None => match self.element() {
                // No multi-column COUNT(DISTINCT a, b).
                Expr::Tuple { elements, .. } if self.distinct && elements.len() > 1 => {
                    return Err(MergeError::AfterDistinct("aggregate"));
                }
                Expr::Tuple { mut elements, .. } if !elements.is_empty() => elements.remove(0),
                element => element,
            },
        };
        self.check_expr(&arg)?;

        let ty = arg.ty();
        let expected = match kind {
            AggregateKind::Count => None,
            AggregateKind::Sum | AggregateKind::Avg => {
                (!matches!(ty, SemType::Numeric | SemType::Unknown)).then_some("numeric")
            }
            AggregateKind::Min | AggregateKind::Max => {
                (!(ty.is_scalar() || ty == SemType::Unknown)).then_some("scalar")
            }
        };
        if let Some(expected) = expected {
            return Err(MergeError::Type {
                clause: "aggregate",
                expected,
                found: ty,
            });
        }
        if matches!(ty, SemType::Tuple | SemType::Collection(_)) {
            return Err(MergeError::Type {
                clause: "aggregate",
                expected: "single-valued",
                found: ty,
            });
        }

        Ok(Self {
            projection: Some(Expr::Aggregate {
                kind,
                arg: Box::new(arg),
                distinct: self.distinct,
            }),
            ordering: vec![],
            distinct: false,
            ..self.clone()
        })
    }

    /// Attach a hint.
    pub fn with_hint(&self, name: &str, value: &Value) -> Result<Self, QueryError> {
        Ok(Self {
            hints: self.hints.set(name, value)?,
            ..self.clone()
        })
    }

    pub fn with_hints(&self, hints: Hints) -> Self {
        Self {
            hints,
            ..self.clone()
        }
    }

    /// Check that every expression is translated and every source reference
    /// resolves.
    pub fn validate(&self) -> Result<(), MergeError> {
        for (index, origin) in self.sources.iter().enumerate() {
            if let SourceOrigin::Path { parent, .. } = origin {
                if parent.0 >= index {
                    return Err(MergeError::DanglingSource(*parent));
                }
            }
        }
        let exprs = self
            .predicate
            .iter()
            .chain(self.projection.iter())
            .chain(self.ordering.iter().map(|k| &k.expr));
        for expr in exprs {
            self.check_expr(expr)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
