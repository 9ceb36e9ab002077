//! Recorded operations - the extracted form of a lambda body.

use std::fmt;
use std::sync::Arc;

use crate::sql::expr::{BinaryOperator, ScalarFunction, UnaryOperator};
use crate::value::Value;

use super::eval::EvalError;

/// Index of an op inside its [`Trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub(crate) usize);

impl OpId {
    pub fn index(self) -> usize {
        self.0
    }
}

type ExternalBody = dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync;

/// A function the query language knows nothing about.
///
/// Calls to it can still run client-side, which is what a fallback stage does.
#[derive(Clone)]
pub struct ExternalFn {
    name: Arc<str>,
    body: Arc<ExternalBody>,
}

impl ExternalFn {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.body)(args)
    }
}

impl fmt::Debug for ExternalFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExternalFn").field(&self.name).finish()
    }
}

/// Callee of a [`Op::Call`].
#[derive(Debug, Clone)]
pub enum Callee {
    /// Registered function with a query-language equivalent.
    Known(ScalarFunction),
    External(ExternalFn),
}

/// One recorded operation.
#[derive(Debug, Clone)]
pub enum Op {
    /// The n-th lambda parameter.
    Param(usize),
    /// Inline constant.
    Const(Value),
    /// Named captured value.
    Capture { name: String, value: Value },
    Field { base: OpId, attribute: String },
    Binary {
        op: BinaryOperator,
        left: OpId,
        right: OpId,
    },
    Unary { op: UnaryOperator, operand: OpId },
    Branch {
        cond: OpId,
        then: OpId,
        otherwise: OpId,
    },
    Tuple(Vec<OpId>),
    Element { base: OpId, index: usize },
    Call { callee: Callee, args: Vec<OpId> },
    /// Stream over a to-many attribute.
    StreamFrom { collection: OpId },
    /// Stream over all instances of an entity, through the source provider.
    StreamEntity { provider: OpId, entity: String },
}

impl Op {
    /// Ops this op reads.
    pub fn inputs(&self) -> Vec<OpId> {
        match self {
            Op::Param(_) | Op::Const(_) | Op::Capture { .. } => vec![],
            Op::Field { base, .. } | Op::Element { base, .. } => vec![*base],
            Op::Binary { left, right, .. } => vec![*left, *right],
            Op::Unary { operand, .. } => vec![*operand],
            Op::Branch {
                cond,
                then,
                otherwise,
            } => vec![*cond, *then, *otherwise],
            Op::Tuple(items) => items.clone(),
            Op::Call { args, .. } => args.clone(),
            Op::StreamFrom { collection } => vec![*collection],
            Op::StreamEntity { provider, .. } => vec![*provider],
        }
    }

    pub fn is_external_call(&self) -> bool {
        matches!(
            self,
            Op::Call {
                callee: Callee::External(_),
                ..
            }
        )
    }
}

/// The extracted body of a lambda.
#[derive(Debug, Clone)]
pub struct Trace {
    pub(crate) arity: usize,
    pub(crate) ops: Vec<Op>,
    pub(crate) result: OpId,
}

impl Trace {
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn result(&self) -> OpId {
        self.result
    }

    pub fn op(&self, id: OpId) -> &Op {
        &self.ops[id.0]
    }

    /// Named values the lambda closed over.
    pub fn captures(&self) -> Vec<(&str, &Value)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Capture { name, value } => Some((name.as_str(), value)),
                _ => None,
            })
            .collect()
    }

    /// External calls, in recording order, including ones whose result is
    /// never used.
    pub fn external_calls(&self) -> impl Iterator<Item = (OpId, &ExternalFn)> {
        self.ops.iter().enumerate().filter_map(|(i, op)| match op {
            Op::Call {
                callee: Callee::External(f),
                ..
            } => Some((OpId(i), f)),
            _ => None,
        })
    }

    /// Marks every op the result depends on.
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.ops.len()];
        let mut stack = vec![self.result];
        while let Some(id) = stack.pop() {
            if seen[id.0] {
                continue;
            }
            seen[id.0] = true;
            stack.extend(self.ops[id.0].inputs());
        }
        seen
    }
}
