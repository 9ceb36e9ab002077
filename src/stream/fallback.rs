//! Client-side completion of untranslatable clauses.
//!
//! When `exceptionOnTranslationFail` is off and a clause cannot be merged into
//! the query model, the clause becomes a [`Step`] of the stream's [`Residual`]:
//! the reduced query runs on the executor and every returned element passes
//! through the residual steps in order. Once a residual exists, every later
//! clause is appended to it as well.
//!
//! ```text
//! executor rows ──assemble──▶ elements ──step 1──▶ ... ──step n──▶ caller
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::compile::compile;
use crate::error::{QueryError, QueryResult};
use crate::executor::{ExecutorError, QueryExecutor};
use crate::lambda::{ClientFn, EntitySource, EvalError};
use crate::sql::expr::AggregateKind;
use crate::sql::query::{QueryModel, SortDir};
use crate::sql::Dialect;
use crate::value::Value;

use super::cursor::{assemble, fetch_all};

/// Boxed element iterator shared by the stream stages.
pub type Elements<'e> = Box<dyn Iterator<Item = QueryResult<Value>> + 'e>;

/// One client-side stage.
#[derive(Debug, Clone)]
pub enum Step {
    Map(ClientFn),
    Filter(ClientFn),
    /// Pair each element with every item of the stream the function returns.
    FlatMap(ClientFn),
    Sort { key: ClientFn, dir: SortDir },
    Distinct,
    Skip(u64),
    Limit(u64),
}

/// Client-side stages run after the compiled query.
#[derive(Debug, Clone, Default)]
pub struct Residual {
    steps: Vec<Step>,
}

impl Residual {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn push(&self, step: Step) -> Residual {
        let mut steps = self.steps.clone();
        steps.push(step);
        Residual { steps }
    }

    /// Chain every step onto `elements`.
    pub fn apply<'e>(&self, elements: Elements<'e>, context: Context<'e>) -> Elements<'e> {
        self.steps
            .iter()
            .cloned()
            .fold(elements, |elements, step| stage(elements, step, context))
    }
}

/// What a client-side stage needs to stream entities.
#[derive(Clone, Copy)]
pub struct Context<'e> {
    pub executor: &'e dyn QueryExecutor,
    pub dialect: Dialect,
}

impl<'e> Context<'e> {
    pub fn entities(&self) -> ExecutorEntities<'e> {
        ExecutorEntities {
            executor: self.executor,
            dialect: self.dialect,
            cache: HashMap::new(),
            error: None,
        }
    }
}

/// Loads entity instances through the executor, once per type.
pub struct ExecutorEntities<'e> {
    executor: &'e dyn QueryExecutor,
    dialect: Dialect,
    cache: HashMap<String, Vec<Value>>,
    /// The executor failure behind the last `EntitySource` error.
    error: Option<ExecutorError>,
}

impl ExecutorEntities<'_> {
    fn load(&self, entity: &str) -> QueryResult<Vec<Value>> {
        let query = compile(&QueryModel::root(entity), self.dialect)?;
        fetch_all(self.executor, &query)?
            .into_iter()
            .map(|row| assemble(row, &query.shape))
            .collect()
    }

    /// Call a client function, surfacing executor failures unchanged.
    pub fn call(&mut self, f: &ClientFn, args: &[Value]) -> QueryResult<Value> {
        match f.call(args, self) {
            Ok(value) => Ok(value),
            Err(EvalError::EntitySource(reason)) => match self.error.take() {
                Some(error) => Err(QueryError::Executor(error)),
                None => Err(EvalError::EntitySource(reason).into()),
            },
            Err(e) => Err(e.into()),
        }
    }
}

impl EntitySource for ExecutorEntities<'_> {
    fn entities(&mut self, entity: &str) -> Result<Vec<Value>, EvalError> {
        if let Some(cached) = self.cache.get(entity) {
            return Ok(cached.clone());
        }
        match self.load(entity) {
            Ok(values) => {
                self.cache.insert(entity.to_string(), values.clone());
                Ok(values)
            }
            Err(QueryError::Executor(error)) => {
                let reason = error.to_string();
                self.error = Some(error);
                Err(EvalError::EntitySource(reason))
            }
            Err(other) => Err(EvalError::EntitySource(other.to_string())),
        }
    }
}

fn expect_bool(value: Value, operation: &str) -> QueryResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::TypeMismatch {
            operation: operation.into(),
            found: other.kind(),
        }
        .into()),
    }
}

fn stage<'e>(mut elements: Elements<'e>, step: Step, context: Context<'e>) -> Elements<'e> {
    match step {
        Step::Map(f) => {
            let mut entities = context.entities();
            Box::new(elements.map(move |e| e.and_then(|e| entities.call(&f, &[e]))))
        }

        Step::Filter(f) => {
            let mut entities = context.entities();
            Box::new(elements.filter_map(move |e| {
                let keep = e.and_then(|e| {
                    let keep = expect_bool(entities.call(&f, &[e.clone()])?, "where")?;
                    Ok(keep.then_some(e))
                });
                keep.transpose()
            }))
        }

        Step::FlatMap(f) => {
            let mut entities = context.entities();
            Box::new(elements.flat_map(move |e| {
                let joined = e.and_then(|e| {
                    match entities.call(&f, &[e.clone(), Value::Null])? {
                        Value::List(items) => Ok(items
                            .into_iter()
                            .map(|item| Ok(Value::pair(e.clone(), item)))
                            .collect()),
                        other => Err(QueryError::from(EvalError::TypeMismatch {
                            operation: "join".into(),
                            found: other.kind(),
                        })),
                    }
                });
                joined.unwrap_or_else(|error| vec![Err(error)])
            }))
        }

        Step::Sort { key, dir } => {
            let mut entities = context.entities();
            let mut pending = Some(elements);
            let mut sorted = Vec::new().into_iter();
            Box::new(std::iter::from_fn(move || {
                if let Some(elements) = pending.take() {
                    sorted = sort(elements, &key, dir, &mut entities).into_iter();
                }
                sorted.next()
            }))
        }

        Step::Distinct => {
            let mut seen = HashSet::new();
            Box::new(elements.filter(move |e| match e {
                Ok(value) => seen.insert(distinct_key(value)),
                Err(_) => true,
            }))
        }

        Step::Skip(n) => {
            let mut remaining = n;
            Box::new(std::iter::from_fn(move || loop {
                let item = elements.next()?;
                if remaining > 0 && item.is_ok() {
                    remaining -= 1;
                    continue;
                }
                return Some(item);
            }))
        }

        Step::Limit(n) => {
            let mut remaining = n;
            Box::new(std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let item = elements.next()?;
                if item.is_ok() {
                    remaining -= 1;
                }
                Some(item)
            }))
        }
    }
}

/// Stable sort by a computed key. Unordered keys compare equal.
fn sort(
    elements: Elements<'_>,
    key: &ClientFn,
    dir: SortDir,
    entities: &mut ExecutorEntities<'_>,
) -> Vec<QueryResult<Value>> {
    let keyed: QueryResult<Vec<(Value, Value)>> = elements
        .map(|e| {
            let e = e?;
            let k = entities.call(key, &[e.clone()])?;
            Ok((k, e))
        })
        .collect();
    match keyed {
        Ok(mut keyed) => {
            keyed.sort_by(|(a, _), (b, _)| {
                let ord = a.compare(b).unwrap_or(Ordering::Equal);
                match dir {
                    SortDir::Asc => ord,
                    SortDir::Desc => ord.reverse(),
                }
            });
            keyed.into_iter().map(|(_, e)| Ok(e)).collect()
        }
        Err(error) => vec![Err(error)],
    }
}

fn distinct_key(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

// =============================================================================
// Aggregates
// =============================================================================

/// Fold aggregate input values client-side. Nulls are ignored, as in SQL.
pub fn fold_aggregate(kind: AggregateKind, values: Vec<Value>) -> QueryResult<Value> {
    let present = || values.iter().filter(|v| !v.is_null());
    match kind {
        AggregateKind::Count => Ok(Value::Int(values.len() as i64)),
        AggregateKind::Sum | AggregateKind::Avg => numeric(kind, present()),
        AggregateKind::Min | AggregateKind::Max => extreme(kind, present()),
    }
}

fn mismatch(kind: AggregateKind, value: &Value) -> QueryError {
    EvalError::TypeMismatch {
        operation: kind.name().to_lowercase(),
        found: value.kind(),
    }
    .into()
}

fn numeric<'v>(kind: AggregateKind, values: impl Iterator<Item = &'v Value>) -> QueryResult<Value> {
    let mut count = 0usize;
    let mut int_sum: i64 = 0;
    let mut float_sum = 0.0;
    let mut all_int = true;
    for value in values {
        match value {
            Value::Int(n) => {
                int_sum = int_sum.wrapping_add(*n);
                float_sum += *n as f64;
            }
            Value::Float(f) => {
                all_int = false;
                float_sum += f;
            }
            other => return Err(mismatch(kind, other)),
        }
        count += 1;
    }
    Ok(match kind {
        _ if count == 0 => Value::Null,
        AggregateKind::Sum if all_int => Value::Int(int_sum),
        AggregateKind::Sum => Value::Float(float_sum),
        _ => Value::Float(float_sum / count as f64),
    })
}

fn extreme<'v>(kind: AggregateKind, values: impl Iterator<Item = &'v Value>) -> QueryResult<Value> {
    let mut best: Option<&Value> = None;
    for value in values {
        best = Some(match best {
            None => value,
            Some(current) => {
                let ord = value
                    .compare(current)
                    .ok_or_else(|| mismatch(kind, value))?;
                let better = match kind {
                    AggregateKind::Min => ord == Ordering::Less,
                    _ => ord == Ordering::Greater,
                };
                if better {
                    value
                } else {
                    current
                }
            }
        });
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}
