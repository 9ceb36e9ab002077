//! Concrete evaluation of a trace, used by client-side fallback stages.
//!
//! External calls whose results feed nothing run first, in recording order,
//! the way statements before a `return` would. The result is then evaluated
//! on demand, so only the taken arm of a branch is computed.

use std::cmp::Ordering;

use crate::sql::expr::{BinaryOperator, UnaryOperator};
use crate::value::Value;

use super::functions::apply_known;
use super::op::{Callee, Op, OpId, Trace};

/// Failure while evaluating a lambda over concrete values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("lambda expects argument {0} but it was not supplied")]
    MissingArgument(usize),

    #[error("{entity} has no attribute {attribute}")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("cannot read {0} of null")]
    NullNavigation(String),

    #[error("{operation} is not defined for {found}")]
    TypeMismatch {
        operation: String,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("tuple has no element {0}")]
    IndexOutOfRange(usize),

    #[error("{function} failed: {message}")]
    External { function: String, message: String },

    #[error("entity source unavailable: {0}")]
    EntitySource(String),
}

impl EvalError {
    /// Error for external functions to return.
    pub fn external(function: &str, message: impl Into<String>) -> Self {
        EvalError::External {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// Supplies all instances of an entity type to a lambda that streams one.
pub trait EntitySource {
    fn entities(&mut self, entity: &str) -> Result<Vec<Value>, EvalError>;
}

/// Entity source for lambdas that never stream entities.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEntities;

impl EntitySource for NoEntities {
    fn entities(&mut self, entity: &str) -> Result<Vec<Value>, EvalError> {
        Err(EvalError::EntitySource(format!(
            "no provider available to stream {}",
            entity
        )))
    }
}

/// Evaluate `trace` over `args`.
pub fn evaluate(
    trace: &Trace,
    args: &[Value],
    source: &mut dyn EntitySource,
) -> Result<Value, EvalError> {
    let mut eval = Evaluator {
        trace,
        args,
        source,
        memo: vec![None; trace.ops.len()],
    };
    let reachable = trace.reachable();
    for (id, _) in trace.external_calls() {
        if !reachable[id.0] {
            eval.eval(id)?;
        }
    }
    eval.eval(trace.result)
}

struct Evaluator<'a> {
    trace: &'a Trace,
    args: &'a [Value],
    source: &'a mut dyn EntitySource,
    memo: Vec<Option<Value>>,
}

impl Evaluator<'_> {
    fn eval(&mut self, id: OpId) -> Result<Value, EvalError> {
        if let Some(value) = &self.memo[id.0] {
            return Ok(value.clone());
        }
        let value = self.compute(id)?;
        self.memo[id.0] = Some(value.clone());
        Ok(value)
    }

    fn compute(&mut self, id: OpId) -> Result<Value, EvalError> {
        let trace = self.trace;
        match trace.op(id) {
            Op::Param(index) => self
                .args
                .get(*index)
                .cloned()
                .ok_or(EvalError::MissingArgument(*index)),
            Op::Const(value) | Op::Capture { value, .. } => Ok(value.clone()),
            Op::Field { base, attribute } => {
                let base = self.eval(*base)?;
                read_attribute(&base, attribute)
            }
            Op::Binary { op, left, right } => self.binary(*op, *left, *right),
            Op::Unary { op, operand } => {
                let operand = self.eval(*operand)?;
                unary(*op, operand)
            }
            Op::Branch {
                cond,
                then,
                otherwise,
            } => match self.eval(*cond)? {
                Value::Bool(true) => self.eval(*then),
                Value::Bool(false) => self.eval(*otherwise),
                other => Err(EvalError::TypeMismatch {
                    operation: "branch condition".into(),
                    found: other.kind(),
                }),
            },
            Op::Tuple(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(*item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Tuple(values))
            }
            Op::Element { base, index } => match self.eval(*base)? {
                Value::Tuple(mut items) if *index < items.len() => Ok(items.swap_remove(*index)),
                Value::Tuple(_) => Err(EvalError::IndexOutOfRange(*index)),
                other => Err(EvalError::TypeMismatch {
                    operation: format!("element {}", index),
                    found: other.kind(),
                }),
            },
            Op::Call { callee, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(*arg))
                    .collect::<Result<Vec<_>, _>>()?;
                match callee {
                    Callee::Known(func) => match values.first() {
                        Some(arg) => apply_known(*func, arg),
                        None => Err(EvalError::MissingArgument(0)),
                    },
                    Callee::External(function) => function.invoke(&values),
                }
            }
            Op::StreamFrom { collection } => match self.eval(*collection)? {
                Value::List(items) => Ok(Value::List(items)),
                Value::Null => Ok(Value::List(vec![])),
                other => Err(EvalError::TypeMismatch {
                    operation: "stream".into(),
                    found: other.kind(),
                }),
            },
            Op::StreamEntity { entity, .. } => Ok(Value::List(self.source.entities(entity)?)),
        }
    }

    fn binary(&mut self, op: BinaryOperator, left: OpId, right: OpId) -> Result<Value, EvalError> {
        let lhs = self.eval(left)?;
        match (op, &lhs) {
            (BinaryOperator::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
            (BinaryOperator::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let rhs = self.eval(right)?;
        binary(op, lhs, rhs)
    }
}

fn read_attribute(base: &Value, attribute: &str) -> Result<Value, EvalError> {
    match base {
        Value::Entity(entity) => {
            entity
                .get(attribute)
                .cloned()
                .ok_or_else(|| EvalError::UnknownAttribute {
                    entity: entity.type_name.clone(),
                    attribute: attribute.into(),
                })
        }
        Value::Null => Err(EvalError::NullNavigation(attribute.into())),
        other => Err(EvalError::TypeMismatch {
            operation: format!("read of {}", attribute),
            found: other.kind(),
        }),
    }
}

/// Apply a binary operator to two concrete values.
pub fn binary(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let mismatch = |found: &Value| EvalError::TypeMismatch {
        operation: format!("operator {}", op.symbol()),
        found: found.kind(),
    };
    match op {
        BinaryOperator::And | BinaryOperator::Or => match (lhs.as_bool(), rhs.as_bool()) {
            (Some(a), Some(b)) if op == BinaryOperator::And => Ok(Value::Bool(a && b)),
            (Some(a), Some(b)) => Ok(Value::Bool(a || b)),
            (None, _) => Err(mismatch(&lhs)),
            (_, None) => Err(mismatch(&rhs)),
        },
        BinaryOperator::Eq => Ok(Value::Bool(equals(&lhs, &rhs))),
        BinaryOperator::Ne => Ok(Value::Bool(!equals(&lhs, &rhs))),
        BinaryOperator::Lt | BinaryOperator::Gt | BinaryOperator::Lte | BinaryOperator::Gte => {
            let ordering = match (&lhs, &rhs) {
                (Value::Null, _) | (_, Value::Null) => return Ok(Value::Bool(false)),
                _ => lhs.compare(&rhs).ok_or_else(|| mismatch(&rhs))?,
            };
            Ok(Value::Bool(match op {
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                BinaryOperator::Lte => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOperator::Concat => Ok(Value::String(format!("{}{}", lhs, rhs))),
        BinaryOperator::Plus
            if matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_)) =>
        {
            Ok(Value::String(format!("{}{}", lhs, rhs)))
        }
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Mod => arithmetic(op, &lhs, &rhs).ok_or_else(|| {
            if lhs.as_float().is_none() {
                mismatch(&lhs)
            } else {
                mismatch(&rhs)
            }
        })?,
    }
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            lhs.compare(rhs) == Some(Ordering::Equal)
        }
        _ => lhs == rhs,
    }
}

fn arithmetic(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Option<Result<Value, EvalError>> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let (a, b) = (*a, *b);
        return Some(match op {
            BinaryOperator::Plus => Ok(Value::Int(a.wrapping_add(b))),
            BinaryOperator::Minus => Ok(Value::Int(a.wrapping_sub(b))),
            BinaryOperator::Mul => Ok(Value::Int(a.wrapping_mul(b))),
            BinaryOperator::Div if b == 0 => Err(EvalError::DivisionByZero),
            BinaryOperator::Div => Ok(Value::Int(a.wrapping_div(b))),
            BinaryOperator::Mod if b == 0 => Err(EvalError::DivisionByZero),
            _ => Ok(Value::Int(a.wrapping_rem(b))),
        });
    }
    let (a, b) = (lhs.as_float()?, rhs.as_float()?);
    Some(Ok(Value::Float(match op {
        BinaryOperator::Plus => a + b,
        BinaryOperator::Minus => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => a / b,
        _ => a % b,
    })))
}

fn unary(op: UnaryOperator, operand: Value) -> Result<Value, EvalError> {
    match (op, operand) {
        (UnaryOperator::IsNull, v) => Ok(Value::Bool(v.is_null())),
        (UnaryOperator::IsNotNull, v) => Ok(Value::Bool(!v.is_null())),
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Minus, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOperator::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (op, other) => Err(EvalError::TypeMismatch {
            operation: format!("{:?}", op),
            found: other.kind(),
        }),
    }
}
