//! Lambda capture.
//!
//! Selectors and predicates are closures over symbolic [`Sym`] handles.
//! [`Lambda::extract`] runs the closure once against placeholders and returns
//! the recorded [`Trace`]; no row data is touched. Opaque lambdas wrap a plain
//! closure over concrete values: they cannot be extracted, only evaluated
//! client-side.
//!
//! ```text
//! Lambda ──extract──▶ Trace ──interp──▶ Expr
//!    │                  │
//!    └───opaque─────────┴──eval──▶ Value   (fallback stages)
//! ```

pub mod eval;
pub mod functions;
pub mod op;
pub mod sym;

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub use eval::{EntitySource, EvalError, NoEntities};
pub use functions::known_function;
pub use op::{Callee, ExternalFn, Op, OpId, Trace};
pub use sym::{captured, Operand, Sym};

use sym::Recorder;

use crate::value::Value;

type TracedBody = dyn Fn(&[Sym]) -> Operand + Send + Sync;
type OpaqueBody = dyn Fn(&Value) -> Result<Value, EvalError> + Send + Sync;

/// Why a lambda could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("opaque lambda has no analyzable body")]
    Opaque,

    #[error("lambda uses a handle from another lambda")]
    ForeignHandle,

    #[error("lambda takes {found} argument(s), clause supplies {expected}")]
    ArityMismatch { expected: usize, found: usize },
}

#[derive(Clone)]
enum Body {
    Traced(Arc<TracedBody>),
    Opaque(Arc<OpaqueBody>),
}

/// A selector, predicate or join function.
#[derive(Clone)]
pub struct Lambda {
    arity: usize,
    body: Body,
}

impl Lambda {
    /// One-argument traced lambda.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(Sym) -> R + Send + Sync + 'static,
        R: Into<Operand>,
    {
        Self {
            arity: 1,
            body: Body::Traced(Arc::new(move |args: &[Sym]| match args {
                [a, ..] => f(a.clone()).into(),
                [] => Operand::Value(Value::Null),
            })),
        }
    }

    /// Two-argument traced lambda, e.g. `(row, source) -> source.stream_of(..)`.
    pub fn new2<F, R>(f: F) -> Self
    where
        F: Fn(Sym, Sym) -> R + Send + Sync + 'static,
        R: Into<Operand>,
    {
        Self {
            arity: 2,
            body: Body::Traced(Arc::new(move |args: &[Sym]| match args {
                [a, b, ..] => f(a.clone(), b.clone()).into(),
                _ => Operand::Value(Value::Null),
            })),
        }
    }

    /// One-argument lambda over concrete values. Never translated.
    pub fn opaque<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            arity: 1,
            body: Body::Opaque(Arc::new(f)),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.body, Body::Opaque(_))
    }

    /// Record the lambda body.
    pub fn extract(&self) -> Result<Trace, ExtractError> {
        let build = match &self.body {
            Body::Traced(build) => build,
            Body::Opaque(_) => return Err(ExtractError::Opaque),
        };
        let rec = Rc::new(Recorder::default());
        let params: Vec<Sym> = (0..self.arity).map(|i| Sym::param(&rec, i)).collect();
        let result = match build(&params) {
            Operand::Sym(sym) if sym.belongs_to(&rec) => sym.id(),
            other => rec.lift(other),
        };
        drop(params);
        if rec.saw_foreign() {
            return Err(ExtractError::ForeignHandle);
        }
        Ok(Trace {
            arity: self.arity,
            ops: rec.take(),
            result,
        })
    }

    /// Record the lambda body, checking it takes `expected` arguments.
    pub fn extract_with_arity(&self, expected: usize) -> Result<Trace, ExtractError> {
        if self.arity != expected {
            return Err(ExtractError::ArityMismatch {
                expected,
                found: self.arity,
            });
        }
        self.extract()
    }

    /// Prepare the lambda for repeated client-side evaluation.
    pub fn client_fn(&self) -> Result<ClientFn, ExtractError> {
        match &self.body {
            Body::Traced(_) => Ok(ClientFn::Traced(Arc::new(self.extract()?))),
            Body::Opaque(f) => Ok(ClientFn::Opaque(Arc::clone(f))),
        }
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            Body::Traced(_) => "traced",
            Body::Opaque(_) => "opaque",
        };
        f.debug_struct("Lambda")
            .field("arity", &self.arity)
            .field("kind", &kind)
            .finish()
    }
}

/// A lambda ready to run over concrete values.
#[derive(Clone)]
pub enum ClientFn {
    Traced(Arc<Trace>),
    Opaque(Arc<OpaqueBody>),
}

impl ClientFn {
    pub fn call(&self, args: &[Value], source: &mut dyn EntitySource) -> Result<Value, EvalError> {
        match self {
            ClientFn::Traced(trace) => eval::evaluate(trace, args, source),
            ClientFn::Opaque(f) => match args.first() {
                Some(arg) => f(arg),
                None => Err(EvalError::MissingArgument(0)),
            },
        }
    }
}

impl fmt::Debug for ClientFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientFn::Traced(trace) => f.debug_tuple("Traced").field(&trace.ops().len()).finish(),
            ClientFn::Opaque(_) => f.write_str("Opaque"),
        }
    }
}
