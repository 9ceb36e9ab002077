//! Lazy query streams.
//!
//! A [`QueryStream`] is an immutable pipeline value: a shared [`QueryModel`],
//! an optional client-side [`Residual`], and the first failure recorded while
//! chaining. Chain operations interpret their lambda, merge the result into a
//! new model and return a new stream; nothing reaches the executor until a
//! terminal operation runs.
//!
//! ```text
//! stream_all ─▶ select ─▶ filter ─▶ join ─▶ ... ─▶ to_list / iter / count
//!                  │          │
//!                  └─ merged into QueryModel, or (hint off) appended to Residual
//! ```
//!
//! Per clause the outcome is decided once. A clause that does not translate
//! either records a failure returned by every terminal operation
//! (`exceptionOnTranslationFail = true`, the default) or becomes a residual
//! step; from then on every later clause runs client-side too.

mod cursor;
pub mod fallback;
mod provider;

use std::fmt;
use std::sync::Arc;

pub use cursor::Cursor;
pub use fallback::{Residual, Step};
pub use provider::StreamProvider;

use crate::compile::{compile, CompiledQuery};
use crate::error::{Clause, QueryError, QueryResult, TranslationError};
use crate::executor::QueryExecutor;
use crate::interp::{Binding, Interpreted, Interpreter};
use crate::lambda::{ClientFn, ExtractError, Lambda};
use crate::metamodel::Metamodel;
use crate::sql::expr::{AggregateKind, Expr};
use crate::sql::query::{Hints, MergeError, QueryModel, SortDir, EXCEPTION_ON_TRANSLATION_FAIL};
use crate::sql::Dialect;
use crate::value::{FromValue, Value};

use cursor::{assemble, fetch_all};
use fallback::{fold_aggregate, Context, Elements};

/// A composable, lazily executed query over one entity type.
#[derive(Clone)]
pub struct QueryStream<'e> {
    executor: &'e dyn QueryExecutor,
    metamodel: Arc<Metamodel>,
    dialect: Dialect,
    model: Arc<QueryModel>,
    residual: Option<Residual>,
    fallbacks: Vec<String>,
    failure: Option<QueryError>,
}

impl<'e> QueryStream<'e> {
    pub(crate) fn new(
        executor: &'e dyn QueryExecutor,
        metamodel: Arc<Metamodel>,
        dialect: Dialect,
        model: QueryModel,
    ) -> Self {
        Self {
            executor,
            metamodel,
            dialect,
            model: Arc::new(model),
            residual: None,
            fallbacks: Vec::new(),
            failure: None,
        }
    }

    /// Record a failure; the first one wins.
    pub(crate) fn failed(mut self, error: QueryError) -> Self {
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        self
    }

    /// The query model terminal operations compile.
    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    /// Client-side stages, if any clause fell back.
    pub fn residual(&self) -> Option<&Residual> {
        self.residual.as_ref()
    }

    /// Why each fallen-back clause did not translate, in clause order.
    pub fn fallback_reasons(&self) -> &[String] {
        &self.fallbacks
    }

    pub fn hints(&self) -> Hints {
        self.model.hints()
    }

    fn with_model(&self, model: QueryModel) -> Self {
        Self {
            model: Arc::new(model),
            ..self.clone()
        }
    }

    fn push_step(&self, step: Step) -> Self {
        let residual = self.residual.clone().unwrap_or_default().push(step);
        Self {
            residual: Some(residual),
            ..self.clone()
        }
    }

    fn context(&self) -> Context<'e> {
        Context {
            executor: self.executor,
            dialect: self.dialect,
        }
    }

    // -------------------------------------------------------------------------
    // Translation
    // -------------------------------------------------------------------------

    /// Extract and interpret a lambda against the current element.
    fn translate(&self, clause: Clause, lambda: &Lambda) -> Result<Interpreted, TranslationError> {
        let arity = if clause == Clause::Join && lambda.arity() == 2 {
            2
        } else {
            1
        };
        let trace = lambda
            .extract_with_arity(arity)
            .map_err(|e| TranslationError::ExtractionFailure {
                clause,
                reason: e.to_string(),
            })?;

        let mut bindings = vec![Binding::Element(self.model.element())];
        if arity == 2 {
            bindings.push(Binding::Provider);
        }
        let interpreted = Interpreter::new(&self.metamodel).interpret(&trace, &bindings);
        match interpreted.unsupported_reason() {
            Some(reason) => Err(TranslationError::UnsupportedConstruct {
                clause,
                reason: reason.to_string(),
            }),
            None => Ok(interpreted),
        }
    }

    /// The client-side form of a lambda, if it may run client-side after
    /// `error`. Lambdas that could not be extracted only run when opaque.
    fn runnable(lambda: &Lambda, error: &TranslationError) -> Option<ClientFn> {
        if matches!(error, TranslationError::ExtractionFailure { .. }) && !lambda.is_opaque() {
            return None;
        }
        lambda.client_fn().ok()
    }

    /// Apply the fallback policy to a clause that did not translate.
    fn fall_back(&self, error: TranslationError, step: Option<Step>) -> Self {
        let step = match step {
            Some(step) if !self.model.hints().exception_on_translation_fail => step,
            _ => return self.clone().failed(error.into()),
        };
        let reason = error.to_string();
        tracing::warn!(
            clause = ?error.clause(),
            reason = %reason,
            "clause does not translate, running it client-side"
        );
        let mut stream = self.push_step(step);
        stream.fallbacks.push(reason);
        stream
    }

    /// Merge a lambda clause into the model, or fall back.
    fn lambda_clause(
        &self,
        clause: Clause,
        lambda: &Lambda,
        merge: impl FnOnce(&QueryModel, Interpreted) -> Result<QueryModel, MergeError>,
        step: impl FnOnce(ClientFn) -> Step,
    ) -> Self {
        if self.failure.is_some() {
            return self.clone();
        }
        if self.residual.is_some() {
            return match lambda.client_fn() {
                Ok(f) => self.push_step(step(f)),
                Err(e) => self.clone().failed(extraction_failure(clause, e)),
            };
        }

        let error = match self.translate(clause, lambda) {
            Ok(interpreted) => match merge(&*self.model, interpreted) {
                Ok(model) => return self.with_model(model),
                Err(e) => TranslationError::UnsupportedConstruct {
                    clause,
                    reason: e.to_string(),
                },
            },
            Err(e) => e,
        };
        let step = Self::runnable(lambda, &error).map(step);
        self.fall_back(error, step)
    }

    /// Merge a clause without a lambda into the model, or fall back.
    fn plain_clause(
        &self,
        clause: Clause,
        merge: impl FnOnce(&QueryModel) -> Result<QueryModel, MergeError>,
        step: Step,
    ) -> Self {
        if self.failure.is_some() {
            return self.clone();
        }
        if self.residual.is_some() {
            return self.push_step(step);
        }
        match merge(&*self.model) {
            Ok(model) => self.with_model(model),
            Err(e) => self.fall_back(
                TranslationError::UnsupportedConstruct {
                    clause,
                    reason: e.to_string(),
                },
                Some(step),
            ),
        }
    }

    // -------------------------------------------------------------------------
    // Chain operations
    // -------------------------------------------------------------------------

    /// Replace each element with `f(element)`.
    pub fn select(&self, f: Lambda) -> Self {
        self.lambda_clause(
            Clause::Select,
            &f,
            |model, interpreted| model.select(expression(interpreted, "select")?),
            Step::Map,
        )
    }

    /// Keep the elements for which `f` holds.
    pub fn filter(&self, f: Lambda) -> Self {
        self.lambda_clause(
            Clause::Where,
            &f,
            |model, interpreted| model.filter(expression(interpreted, "where")?),
            Step::Filter,
        )
    }

    /// Alias of [`filter`](Self::filter).
    pub fn r#where(&self, f: Lambda) -> Self {
        self.filter(f)
    }

    /// Pair each element with every item of the stream `f` returns.
    ///
    /// One-argument form: `f` navigates a to-many attribute of the element.
    /// Two-argument form: the second argument is the source provider and
    /// `source.stream_of(entity)` adds an unrelated root source.
    pub fn join(&self, f: Lambda) -> Self {
        self.lambda_clause(
            Clause::Join,
            &f,
            |model, interpreted| match interpreted {
                Interpreted::Join(request) => model.join(request),
                Interpreted::Expr(_) => Err(MergeError::Unsupported(
                    "join lambda must return a stream".into(),
                )),
            },
            Step::FlatMap,
        )
    }

    /// Sort by `f` ascending. A later sort takes precedence over earlier ones.
    pub fn sorted_by(&self, f: Lambda) -> Self {
        self.sort(f, SortDir::Asc)
    }

    /// Sort by `f` descending.
    pub fn sorted_descending_by(&self, f: Lambda) -> Self {
        self.sort(f, SortDir::Desc)
    }

    fn sort(&self, f: Lambda, dir: SortDir) -> Self {
        self.lambda_clause(
            Clause::Sort,
            &f,
            |model, interpreted| model.sort(expression(interpreted, "sorted_by")?, dir),
            |key| Step::Sort { key, dir },
        )
    }

    /// Drop duplicate elements.
    pub fn distinct(&self) -> Self {
        self.plain_clause(Clause::Distinct, QueryModel::distinct, Step::Distinct)
    }

    /// Skip the first `n` elements.
    pub fn skip(&self, n: u64) -> Self {
        self.plain_clause(Clause::Window, |model| Ok(model.skip(n)), Step::Skip(n))
    }

    /// Keep at most `n` elements.
    pub fn limit(&self, n: u64) -> Self {
        self.plain_clause(Clause::Window, |model| Ok(model.limit(n)), Step::Limit(n))
    }

    /// Set an execution hint.
    ///
    /// Fails with `InvalidHint` for unknown names, ill-typed values, and for
    /// re-enabling `exceptionOnTranslationFail` once a clause runs client-side.
    pub fn set_hint(&self, name: &str, value: impl Into<Value>) -> QueryResult<Self> {
        let value = value.into();
        if name == EXCEPTION_ON_TRANSLATION_FAIL
            && value.as_bool() == Some(true)
            && self.residual.is_some()
        {
            return Err(QueryError::InvalidHint {
                name: name.into(),
                reason: "a clause already runs client-side".into(),
            });
        }
        Ok(self.with_model(self.model.with_hint(name, &value)?))
    }

    // -------------------------------------------------------------------------
    // Terminal operations
    // -------------------------------------------------------------------------

    fn check(&self) -> QueryResult<()> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Compile the (reduced) model without executing it.
    pub fn compile(&self) -> QueryResult<CompiledQuery> {
        self.check()?;
        Ok(compile(&self.model, self.dialect)?)
    }

    /// Query text the executor would receive.
    pub fn query_text(&self) -> QueryResult<String> {
        Ok(self.compile()?.text)
    }

    /// Iterate lazily. Rows are fetched as the iterator advances.
    pub fn iter(&self) -> QueryResult<QueryIter<'e>> {
        let query = self.compile()?;
        let shape = query.shape.clone();
        let cursor = Cursor::open(self.executor, query, self.model.hints().automatic_page_size)?;
        let elements: Elements<'e> =
            Box::new(cursor.map(move |row| row.and_then(|row| assemble(row, &shape))));
        let elements = match &self.residual {
            Some(residual) => residual.apply(elements, self.context()),
            None => elements,
        };
        Ok(QueryIter { elements })
    }

    /// Run the query and collect every element.
    pub fn to_list(&self) -> QueryResult<Vec<Value>> {
        self.iter()?.collect()
    }

    /// Run the query and convert every element.
    pub fn collect_as<T: FromValue>(&self) -> QueryResult<Vec<T>> {
        self.iter()?
            .map(|value| -> QueryResult<T> { Ok(T::from_value(value?)?) })
            .collect()
    }

    /// The single element of the stream.
    pub fn get_only_value(&self) -> QueryResult<Value> {
        let mut values = self.to_list()?;
        match values.len() {
            1 => Ok(values.remove(0)),
            n => Err(QueryError::NotSingleValue(n)),
        }
    }

    /// Number of elements.
    pub fn count(&self) -> QueryResult<i64> {
        Ok(i64::from_value(self.aggregate(AggregateKind::Count, None)?)?)
    }

    /// Sum of `f` over the elements; null for an empty stream.
    pub fn sum(&self, f: Lambda) -> QueryResult<Value> {
        self.aggregate(AggregateKind::Sum, Some(&f))
    }

    pub fn min(&self, f: Lambda) -> QueryResult<Value> {
        self.aggregate(AggregateKind::Min, Some(&f))
    }

    pub fn max(&self, f: Lambda) -> QueryResult<Value> {
        self.aggregate(AggregateKind::Max, Some(&f))
    }

    pub fn avg(&self, f: Lambda) -> QueryResult<Value> {
        self.aggregate(AggregateKind::Avg, Some(&f))
    }

    /// Aggregate in the query when possible, else fold client-side.
    fn aggregate(&self, kind: AggregateKind, f: Option<&Lambda>) -> QueryResult<Value> {
        self.check()?;

        if self.residual.is_none() {
            match self.aggregate_model(kind, f) {
                Ok(model) => return self.fetch_single(&model),
                Err(error) => {
                    let runnable = f.map_or(true, |f| Self::runnable(f, &error).is_some());
                    if self.model.hints().exception_on_translation_fail || !runnable {
                        return Err(error.into());
                    }
                    tracing::warn!(
                        reason = %error,
                        "aggregate does not translate, folding client-side"
                    );
                }
            }
        }

        let elements = self.to_list()?;
        let inputs = match f {
            None => elements,
            Some(f) => {
                let f = f
                    .client_fn()
                    .map_err(|e| extraction_failure(Clause::Aggregate, e))?;
                let mut entities = self.context().entities();
                elements
                    .into_iter()
                    .map(|e| entities.call(&f, &[e]))
                    .collect::<QueryResult<Vec<_>>>()?
            }
        };
        fold_aggregate(kind, inputs)
    }

    fn aggregate_model(
        &self,
        kind: AggregateKind,
        f: Option<&Lambda>,
    ) -> Result<QueryModel, TranslationError> {
        let unsupported = |e: MergeError| TranslationError::UnsupportedConstruct {
            clause: Clause::Aggregate,
            reason: e.to_string(),
        };
        let arg = match f {
            Some(f) => {
                let interpreted = self.translate(Clause::Aggregate, f)?;
                Some(expression(interpreted, "aggregate").map_err(unsupported)?)
            }
            None => None,
        };
        self.model.aggregate(kind, arg).map_err(unsupported)
    }

    fn fetch_single(&self, model: &QueryModel) -> QueryResult<Value> {
        let query = compile(model, self.dialect)?;
        let mut rows = fetch_all(self.executor, &query)?;
        match rows.len() {
            1 => {
                let row = rows.remove(0);
                match <[Value; 1]>::try_from(row) {
                    Ok([value]) => Ok(value),
                    Err(row) => Err(QueryError::RowShape {
                        expected: 1,
                        found: row.len(),
                    }),
                }
            }
            n => Err(QueryError::NotSingleValue(n)),
        }
    }
}

fn expression(interpreted: Interpreted, clause: &str) -> Result<Expr, MergeError> {
    match interpreted {
        Interpreted::Expr(expr) => Ok(expr),
        Interpreted::Join(_) => Err(MergeError::Unsupported(format!(
            "{} lambda returns a stream; use join",
            clause
        ))),
    }
}

fn extraction_failure(clause: Clause, error: ExtractError) -> QueryError {
    TranslationError::ExtractionFailure {
        clause,
        reason: error.to_string(),
    }
    .into()
}

impl fmt::Debug for QueryStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStream")
            .field("model", &self.model)
            .field("dialect", &self.dialect)
            .field("residual", &self.residual)
            .field("failure", &self.failure)
            .finish()
    }
}

/// Lazy iterator over stream elements.
pub struct QueryIter<'e> {
    elements: Elements<'e>,
}

impl Iterator for QueryIter<'_> {
    type Item = QueryResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.elements.next()
    }
}
