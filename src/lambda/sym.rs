//! Symbolic handles.
//!
//! A traced lambda is an ordinary closure written against [`Sym`] values.
//! Running it once against placeholder handles records every operation it
//! performs into a shared [`Recorder`]; the resulting op list is the
//! lambda's [`Trace`](super::op::Trace).
//!
//! ```ignore
//! let selector = Lambda::new(|c: Sym| c.get("debt") + c.get("salary") * 2);
//! let predicate = Lambda::new(|c: Sym| c.get("name").eq("Alice"));
//! let joined = Lambda::new(|i: Sym| i.get("suppliers").stream());
//! ```

use std::cell::{Cell, RefCell};
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};
use std::rc::Rc;

use crate::sql::expr::{BinaryOperator, ScalarFunction, UnaryOperator};
use crate::value::Value;

use super::functions::known_function;
use super::op::{Callee, ExternalFn, Op, OpId};

/// Op list shared by every handle of one extraction.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    ops: RefCell<Vec<Op>>,
    /// Set when a handle from another extraction leaked into this one.
    foreign: Cell<bool>,
}

impl Recorder {
    pub(crate) fn push(&self, op: Op) -> OpId {
        let mut ops = self.ops.borrow_mut();
        ops.push(op);
        OpId(ops.len() - 1)
    }

    pub(crate) fn saw_foreign(&self) -> bool {
        self.foreign.get()
    }

    pub(crate) fn take(&self) -> Vec<Op> {
        self.ops.take()
    }

    /// Record an operand, returning the op that produces it.
    pub(crate) fn lift(self: &Rc<Self>, operand: Operand) -> OpId {
        match operand {
            Operand::Sym(sym) if Rc::ptr_eq(&sym.rec, self) => sym.id,
            Operand::Sym(_) => {
                self.foreign.set(true);
                self.push(Op::Const(Value::Null))
            }
            Operand::Value(value) => self.push(Op::Const(value)),
            Operand::Captured { name, value } => self.push(Op::Capture { name, value }),
        }
    }
}

/// A placeholder for a value a lambda computes on.
#[derive(Debug, Clone)]
pub struct Sym {
    rec: Rc<Recorder>,
    id: OpId,
}

/// Anything a [`Sym`] method accepts as an argument.
#[derive(Debug, Clone)]
pub enum Operand {
    Sym(Sym),
    /// Inline constant.
    Value(Value),
    /// A value closed over by the lambda, passed as a named parameter.
    Captured { name: String, value: Value },
}

/// Mark a closed-over value so it is sent as `:name` instead of inlined.
///
/// ```ignore
/// let min = 250;
/// stream.r#where(move |c: Sym| c.get("debt").gt(captured("minDebt", min)))
/// ```
pub fn captured(name: &str, value: impl Into<Value>) -> Operand {
    Operand::Captured {
        name: name.into(),
        value: value.into(),
    }
}

impl Sym {
    pub(crate) fn param(rec: &Rc<Recorder>, index: usize) -> Sym {
        let id = rec.push(Op::Param(index));
        Sym {
            rec: Rc::clone(rec),
            id,
        }
    }

    pub(crate) fn id(&self) -> OpId {
        self.id
    }

    pub(crate) fn belongs_to(&self, rec: &Rc<Recorder>) -> bool {
        Rc::ptr_eq(&self.rec, rec)
    }

    fn record(&self, op: Op) -> Sym {
        Sym {
            rec: Rc::clone(&self.rec),
            id: self.rec.push(op),
        }
    }

    fn lift(&self, operand: impl Into<Operand>) -> OpId {
        self.rec.lift(operand.into())
    }

    fn binary(&self, op: BinaryOperator, other: impl Into<Operand>) -> Sym {
        let right = self.lift(other);
        self.record(Op::Binary {
            op,
            left: self.id,
            right,
        })
    }

    fn unary(&self, op: UnaryOperator) -> Sym {
        self.record(Op::Unary {
            op,
            operand: self.id,
        })
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Read an attribute (a getter call).
    pub fn get(&self, attribute: &str) -> Sym {
        self.record(Op::Field {
            base: self.id,
            attribute: attribute.into(),
        })
    }

    /// First component of a pair.
    pub fn first(&self) -> Sym {
        self.element(0)
    }

    /// Second component of a pair.
    pub fn second(&self) -> Sym {
        self.element(1)
    }

    pub fn element(&self, index: usize) -> Sym {
        self.record(Op::Element {
            base: self.id,
            index,
        })
    }

    /// Stream over a to-many attribute; only meaningful as a join result.
    pub fn stream(&self) -> Sym {
        self.record(Op::StreamFrom {
            collection: self.id,
        })
    }

    /// Stream over every instance of `entity`; call it on the source-provider
    /// parameter of a two-argument join.
    pub fn stream_of(&self, entity: &str) -> Sym {
        self.record(Op::StreamEntity {
            provider: self.id,
            entity: entity.into(),
        })
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Pair this value with another.
    pub fn pair(&self, other: impl Into<Operand>) -> Sym {
        let second = self.lift(other);
        self.record(Op::Tuple(vec![self.id, second]))
    }

    /// Build a tuple starting with this value.
    pub fn tuple<I, O>(&self, rest: I) -> Sym
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        let mut items = vec![self.id];
        items.extend(rest.into_iter().map(|item| self.lift(item)));
        self.record(Op::Tuple(items))
    }

    /// `self ? then : otherwise`
    pub fn if_else(&self, then: impl Into<Operand>, otherwise: impl Into<Operand>) -> Sym {
        let then = self.lift(then);
        let otherwise = self.lift(otherwise);
        self.record(Op::Branch {
            cond: self.id,
            then,
            otherwise,
        })
    }

    // -------------------------------------------------------------------------
    // Comparison and logic
    // -------------------------------------------------------------------------

    #[allow(clippy::should_implement_trait)]
    pub fn eq(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Eq, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn ne(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Ne, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn lt(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Lt, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn le(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Lte, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn gt(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Gt, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn ge(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Gte, other)
    }

    pub fn and(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::And, other)
    }

    pub fn or(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Or, other)
    }

    pub fn is_null(&self) -> Sym {
        self.unary(UnaryOperator::IsNull)
    }

    pub fn is_not_null(&self) -> Sym {
        self.unary(UnaryOperator::IsNotNull)
    }

    // -------------------------------------------------------------------------
    // Strings and library functions
    // -------------------------------------------------------------------------

    pub fn concat(&self, other: impl Into<Operand>) -> Sym {
        self.binary(BinaryOperator::Concat, other)
    }

    fn known(&self, func: ScalarFunction) -> Sym {
        self.record(Op::Call {
            callee: Callee::Known(func),
            args: vec![self.id],
        })
    }

    pub fn abs(&self) -> Sym {
        self.known(ScalarFunction::Abs)
    }

    pub fn sqrt(&self) -> Sym {
        self.known(ScalarFunction::Sqrt)
    }

    pub fn to_upper(&self) -> Sym {
        self.known(ScalarFunction::Upper)
    }

    pub fn to_lower(&self) -> Sym {
        self.known(ScalarFunction::Lower)
    }

    pub fn trim(&self) -> Sym {
        self.known(ScalarFunction::Trim)
    }

    pub fn length(&self) -> Sym {
        self.known(ScalarFunction::Length)
    }

    /// Call `function` with this value as the first argument.
    ///
    /// Names found in the known-function registry are recorded as the
    /// registered function; anything else is an external call.
    pub fn call<I, O>(&self, function: &ExternalFn, rest: I) -> Sym
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        let mut args = vec![self.id];
        args.extend(rest.into_iter().map(|arg| self.lift(arg)));
        let callee = match known_function(function.name()) {
            Some(func) if args.len() == 1 => Callee::Known(func),
            _ => Callee::External(function.clone()),
        };
        self.record(Op::Call { callee, args })
    }
}

// =============================================================================
// Operator overloading
// =============================================================================

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Operand>> $trait<T> for Sym {
            type Output = Sym;

            fn $method(self, rhs: T) -> Sym {
                self.binary($op, rhs)
            }
        }

        impl<T: Into<Operand>> $trait<T> for &Sym {
            type Output = Sym;

            fn $method(self, rhs: T) -> Sym {
                self.binary($op, rhs)
            }
        }
    };
}

binary_operator!(Add, add, BinaryOperator::Plus);
binary_operator!(Sub, sub, BinaryOperator::Minus);
binary_operator!(Mul, mul, BinaryOperator::Mul);
binary_operator!(Div, div, BinaryOperator::Div);
binary_operator!(Rem, rem, BinaryOperator::Mod);

impl Neg for Sym {
    type Output = Sym;

    fn neg(self) -> Sym {
        self.unary(UnaryOperator::Minus)
    }
}

impl Neg for &Sym {
    type Output = Sym;

    fn neg(self) -> Sym {
        self.unary(UnaryOperator::Minus)
    }
}

impl Not for Sym {
    type Output = Sym;

    fn not(self) -> Sym {
        self.unary(UnaryOperator::Not)
    }
}

impl Not for &Sym {
    type Output = Sym;

    fn not(self) -> Sym {
        self.unary(UnaryOperator::Not)
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Sym> for Operand {
    fn from(sym: Sym) -> Self {
        Operand::Sym(sym)
    }
}

impl From<&Sym> for Operand {
    fn from(sym: &Sym) -> Self {
        Operand::Sym(sym.clone())
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<i64> for Operand {
    fn from(n: i64) -> Self {
        Operand::Value(n.into())
    }
}

impl From<i32> for Operand {
    fn from(n: i32) -> Self {
        Operand::Value(n.into())
    }
}

impl From<f64> for Operand {
    fn from(f: f64) -> Self {
        Operand::Value(f.into())
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Operand::Value(b.into())
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Value(s.into())
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Operand::Value(s.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> Rc<Recorder> {
        Rc::new(Recorder::default())
    }

    #[test]
    fn test_records_in_order() {
        let rec = recorder();
        let c = Sym::param(&rec, 0);
        let out = c.get("debt") + c.get("salary") * 2;
        let ops = rec.take();

        assert!(matches!(ops[0], Op::Param(0)));
        assert!(matches!(&ops[1], Op::Field { attribute, .. } if attribute == "debt"));
        assert!(matches!(&ops[2], Op::Field { attribute, .. } if attribute == "salary"));
        assert!(matches!(ops[3], Op::Const(Value::Int(2))));
        assert!(matches!(
            ops[4],
            Op::Binary {
                op: BinaryOperator::Mul,
                ..
            }
        ));
        assert!(matches!(
            ops[5],
            Op::Binary {
                op: BinaryOperator::Plus,
                ..
            }
        ));
        assert_eq!(out.id(), OpId(5));
    }

    #[test]
    fn test_foreign_handle_is_flagged() {
        let first = recorder();
        let second = recorder();
        let a = Sym::param(&first, 0);
        let b = Sym::param(&second, 0);

        let _ = a.get("x").eq(&b);
        assert!(first.saw_foreign());
        assert!(!second.saw_foreign());
    }

    #[test]
    fn test_captured_value() {
        let rec = recorder();
        let c = Sym::param(&rec, 0);
        let _ = c.get("debt").gt(captured("minDebt", 250));
        let ops = rec.take();
        assert!(ops.iter().any(
            |op| matches!(op, Op::Capture { name, value } if name == "minDebt" && *value == Value::Int(250))
        ));
    }

    #[test]
    fn test_registered_name_becomes_known_call() {
        let rec = recorder();
        let c = Sym::param(&rec, 0);
        let abs = ExternalFn::new("Math.abs", |args| Ok(args[0].clone()));
        let audit = ExternalFn::new("audit", |_| Ok(Value::Null));

        let _ = c.get("debt").call(&abs, Vec::<Operand>::new());
        let _ = c.call(&audit, Vec::<Operand>::new());
        let ops = rec.take();
        assert!(ops.iter().any(|op| matches!(
            op,
            Op::Call {
                callee: Callee::Known(ScalarFunction::Abs),
                ..
            }
        )));
        assert!(ops.iter().any(Op::is_external_call));
    }
}
