//! Symbolic interpretation of lambda traces.
//!
//! Each recorded op is evaluated over abstract values instead of rows: a
//! parameter stands for the current stream element (an [`Expr`]), field reads
//! extend navigation paths, operators build expression nodes. Anything that has
//! no query-language counterpart turns into [`Expr::Unsupported`] and poisons
//! every expression built on top of it, so a clause either translates as a
//! whole or not at all.
//!
//! A lambda that returns a stream (a to-many attribute or an entity pulled
//! from the source provider) does not yield an expression: it yields a
//! [`JoinRequest`] for the query model to turn into a new source.

pub mod rewrite;

use crate::lambda::{Callee, Op, OpId, Trace};
use crate::metamodel::{AttributeKind, Metamodel, ScalarType};
use crate::sql::expr::{BinaryOperator, Expr, Literal, SemType, SourceId, UnaryOperator};

/// What a lambda parameter stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// The current stream element.
    Element(Expr),
    /// The source provider of a two-argument join.
    Provider,
}

/// A new FROM-clause source asked for by a join lambda.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinRequest {
    /// Navigation from an existing source through a to-many attribute.
    Path {
        parent: SourceId,
        path: Vec<String>,
        entity: String,
    },
    /// An unrelated root source.
    Root { entity: String },
}

impl JoinRequest {
    pub fn entity(&self) -> &str {
        match self {
            JoinRequest::Path { entity, .. } | JoinRequest::Root { entity } => entity,
        }
    }
}

/// Outcome of interpreting one lambda.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpreted {
    Expr(Expr),
    Join(JoinRequest),
}

impl Interpreted {
    /// Reason the result cannot be translated, if any.
    pub fn unsupported_reason(&self) -> Option<&str> {
        match self {
            Interpreted::Expr(Expr::Unsupported { reason }) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Abstract {
    Expr(Expr),
    Provider,
    Stream(JoinRequest),
}

fn unsupported(reason: impl Into<String>) -> Expr {
    Expr::Unsupported {
        reason: reason.into(),
    }
}

fn scalar_type(ty: ScalarType) -> SemType {
    match ty {
        ScalarType::Boolean => SemType::Boolean,
        ScalarType::Numeric => SemType::Numeric,
        ScalarType::String => SemType::String,
    }
}

/// Interprets traces against a metamodel.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'m> {
    metamodel: &'m Metamodel,
}

impl<'m> Interpreter<'m> {
    pub fn new(metamodel: &'m Metamodel) -> Self {
        Self { metamodel }
    }

    /// Interpret `trace` with one binding per lambda parameter.
    pub fn interpret(&self, trace: &Trace, bindings: &[Binding]) -> Interpreted {
        if let Some((_, function)) = trace.external_calls().next() {
            return Interpreted::Expr(unsupported(format!(
                "call to external function {}",
                function.name()
            )));
        }

        let mut values: Vec<Abstract> = Vec::with_capacity(trace.ops().len());
        for op in trace.ops() {
            let value = self.step(op, &values, bindings);
            values.push(value);
        }

        match values.get(trace.result().index()) {
            Some(Abstract::Expr(expr)) => Interpreted::Expr(expr.clone()),
            Some(Abstract::Stream(join)) => Interpreted::Join(join.clone()),
            Some(Abstract::Provider) => {
                Interpreted::Expr(unsupported("source provider used as a value"))
            }
            None => Interpreted::Expr(unsupported("empty trace")),
        }
    }

    fn step(&self, op: &Op, values: &[Abstract], bindings: &[Binding]) -> Abstract {
        let expr = |id: OpId| -> Expr {
            match &values[id.index()] {
                Abstract::Expr(e) => e.clone(),
                Abstract::Provider => unsupported("source provider used as a value"),
                Abstract::Stream(_) => unsupported("stream used as a value"),
            }
        };

        match op {
            Op::Param(index) => match bindings.get(*index) {
                Some(Binding::Element(e)) => Abstract::Expr(e.clone()),
                Some(Binding::Provider) => Abstract::Provider,
                None => Abstract::Expr(unsupported(format!("parameter {} is unbound", index))),
            },
            Op::Const(value) => Abstract::Expr(match Literal::from_value(value) {
                Some(lit) => Expr::Constant(lit),
                None => unsupported(format!("{} constant", value.kind())),
            }),
            Op::Capture { name, value } => Abstract::Expr(match Literal::from_value(value) {
                Some(_) => Expr::Parameter {
                    name: name.clone(),
                    value: value.clone(),
                },
                None => unsupported(format!("captured {} {}", value.kind(), name)),
            }),
            Op::Field { base, attribute } => Abstract::Expr(self.field(expr(*base), attribute)),
            Op::Binary { op, left, right } => {
                Abstract::Expr(binary(*op, expr(*left), expr(*right)))
            }
            Op::Unary { op, operand } => Abstract::Expr(unary(*op, expr(*operand))),
            Op::Branch {
                cond,
                then,
                otherwise,
            } => Abstract::Expr(conditional(expr(*cond), expr(*then), expr(*otherwise))),
            Op::Tuple(items) => {
                let items: Vec<Expr> = items.iter().map(|id| expr(*id)).collect();
                Abstract::Expr(match items.iter().find(|e| e.is_unsupported()) {
                    Some(bad) => bad.clone(),
                    None => Expr::tuple(items),
                })
            }
            Op::Element { base, index } => Abstract::Expr(match expr(*base) {
                bad @ Expr::Unsupported { .. } => bad,
                tuple @ Expr::Tuple { .. } => tuple
                    .element(*index)
                    .unwrap_or_else(|| unsupported(format!("tuple has no element {}", index))),
                other => unsupported(format!("element {} of non-tuple {:?}", index, other.ty())),
            }),
            Op::Call { callee, args } => Abstract::Expr(match callee {
                Callee::Known(func) => {
                    let args: Vec<Expr> = args.iter().map(|id| expr(*id)).collect();
                    if let Some(bad) = args.iter().find(|e| e.is_unsupported()) {
                        bad.clone()
                    } else if args.iter().all(|a| accepts(&func.arg_type(), &a.ty())) {
                        Expr::Function { func: *func, args }
                    } else {
                        unsupported(format!("{} applied to wrong argument type", func.name()))
                    }
                }
                Callee::External(function) => {
                    unsupported(format!("call to external function {}", function.name()))
                }
            }),
            Op::StreamFrom { collection } => self.stream_from(expr(*collection)),
            Op::StreamEntity { provider, entity } => match &values[provider.index()] {
                Abstract::Provider if self.metamodel.contains(entity) => {
                    Abstract::Stream(JoinRequest::Root {
                        entity: entity.clone(),
                    })
                }
                Abstract::Provider => {
                    Abstract::Expr(unsupported(format!("unknown entity type {}", entity)))
                }
                _ => Abstract::Expr(unsupported("stream_of called on a non-provider")),
            },
        }
    }

    fn field(&self, base: Expr, attribute: &str) -> Expr {
        let entity = match base.ty() {
            _ if base.is_unsupported() => return base,
            SemType::Entity(name) => name,
            other => {
                return unsupported(format!("read of {} on {:?} value", attribute, other));
            }
        };
        let ty = match self.metamodel.attribute(&entity, attribute) {
            Some(AttributeKind::Scalar(ty)) => scalar_type(*ty),
            Some(AttributeKind::Reference { reference }) => SemType::Entity(reference.clone()),
            Some(AttributeKind::Collection { collection }) => {
                SemType::Collection(collection.clone())
            }
            None => return unsupported(format!("{} has no attribute {}", entity, attribute)),
        };
        base.navigate(attribute, ty)
    }

    fn stream_from(&self, collection: Expr) -> Abstract {
        match collection {
            Expr::FieldAccess {
                base,
                path,
                ty: SemType::Collection(entity),
            } => match *base {
                Expr::SourceRef { source, .. } => Abstract::Stream(JoinRequest::Path {
                    parent: source,
                    path,
                    entity,
                }),
                _ => Abstract::Expr(unsupported("navigation stream not rooted at a source")),
            },
            bad @ Expr::Unsupported { .. } => Abstract::Expr(bad),
            other => Abstract::Expr(unsupported(format!(
                "stream over non-collection {:?}",
                other.ty()
            ))),
        }
    }
}

/// Whether an argument of type `actual` fits a slot typed `expected`.
fn accepts(expected: &SemType, actual: &SemType) -> bool {
    actual == expected || *actual == SemType::Unknown
}

fn is_null_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(Literal::Null))
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    if left.is_unsupported() {
        return left;
    }
    if right.is_unsupported() {
        return right;
    }

    if matches!(op, BinaryOperator::Eq | BinaryOperator::Ne) {
        let null_test = match op {
            BinaryOperator::Eq => UnaryOperator::IsNull,
            _ => UnaryOperator::IsNotNull,
        };
        if is_null_literal(&right) {
            return Expr::UnaryOp {
                op: null_test,
                expr: Box::new(left),
            };
        }
        if is_null_literal(&left) {
            return Expr::UnaryOp {
                op: null_test,
                expr: Box::new(right),
            };
        }
    }

    let (lt, rt) = (left.ty(), right.ty());
    let op = match op {
        BinaryOperator::Plus if lt == SemType::String || rt == SemType::String => {
            BinaryOperator::Concat
        }
        op => op,
    };

    let valid = if op.is_logical() {
        accepts(&SemType::Boolean, &lt) && accepts(&SemType::Boolean, &rt)
    } else if op.is_arithmetic() {
        accepts(&SemType::Numeric, &lt) && accepts(&SemType::Numeric, &rt)
    } else if op == BinaryOperator::Concat {
        lt.is_scalar() || lt == SemType::Unknown
    } else if matches!(op, BinaryOperator::Eq | BinaryOperator::Ne) {
        !matches!(lt, SemType::Tuple | SemType::Collection(_))
            && !matches!(rt, SemType::Tuple | SemType::Collection(_))
    } else {
        (lt.is_scalar() || lt == SemType::Unknown) && (rt.is_scalar() || rt == SemType::Unknown)
    };
    if !valid {
        return unsupported(format!(
            "operator {} on {:?} and {:?}",
            op.symbol(),
            lt,
            rt
        ));
    }

    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn unary(op: UnaryOperator, operand: Expr) -> Expr {
    if operand.is_unsupported() {
        return operand;
    }
    let ty = operand.ty();
    let valid = match op {
        UnaryOperator::Not => accepts(&SemType::Boolean, &ty),
        UnaryOperator::Minus => accepts(&SemType::Numeric, &ty),
        UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
            !matches!(ty, SemType::Tuple | SemType::Collection(_))
        }
    };
    if !valid {
        return unsupported(format!("{:?} on {:?}", op, ty));
    }
    Expr::UnaryOp {
        op,
        expr: Box::new(operand),
    }
}

fn conditional(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    for part in [&cond, &then, &otherwise] {
        if part.is_unsupported() {
            return part.clone();
        }
    }
    if !accepts(&SemType::Boolean, &cond.ty()) {
        return unsupported("branch on non-boolean condition");
    }
    let (tt, ot) = (then.ty(), otherwise.ty());
    if matches!(tt, SemType::Tuple | SemType::Collection(_))
        || matches!(ot, SemType::Tuple | SemType::Collection(_))
    {
        return unsupported("branch producing a tuple");
    }
    Expr::Conditional {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::{captured, ExternalFn, Lambda, Sym};
    use crate::metamodel::EntityType;
    use crate::sql::expr::{lit_int, lit_str, param, source, ExprExt, ScalarFunction};
    use crate::value::Value;

    fn model() -> Metamodel {
        Metamodel::new()
            .with_entity(
                EntityType::new("Customer")
                    .scalar("name", ScalarType::String)
                    .scalar("country", ScalarType::String)
                    .scalar("debt", ScalarType::Numeric)
                    .scalar("salary", ScalarType::Numeric),
            )
            .with_entity(EntityType::new("Sale").reference("customer", "Customer"))
            .with_entity(
                EntityType::new("Item")
                    .scalar("name", ScalarType::String)
                    .collection("suppliers", "Supplier"),
            )
            .with_entity(EntityType::new("Supplier").scalar("name", ScalarType::String))
    }

    fn run(lambda: Lambda, bindings: &[Binding]) -> Interpreted {
        let model = model();
        let trace = lambda.extract().unwrap();
        Interpreter::new(&model).interpret(&trace, bindings)
    }

    fn customer() -> Binding {
        Binding::Element(source(0, "Customer"))
    }

    fn expr_of(result: Interpreted) -> Expr {
        match result {
            Interpreted::Expr(e) => e,
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic() {
        let e = expr_of(run(
            Lambda::new(|c: Sym| c.get("debt") + c.get("salary") * 2),
            &[customer()],
        ));
        let debt = source(0, "Customer").field("debt", SemType::Numeric);
        let salary = source(0, "Customer").field("salary", SemType::Numeric);
        assert_eq!(e, debt.add(salary.mul(2)));
    }

    #[test]
    fn test_path_compression() {
        let e = expr_of(run(
            Lambda::new(|s: Sym| s.get("customer").get("name")),
            &[Binding::Element(source(0, "Sale"))],
        ));
        match e {
            Expr::FieldAccess { path, ty, .. } => {
                assert_eq!(path, vec!["customer", "name"]);
                assert_eq!(ty, SemType::String);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_string_plus_is_concat() {
        let e = expr_of(run(Lambda::new(|c: Sym| c.get("name") + "!"), &[customer()]));
        assert!(matches!(
            e,
            Expr::BinaryOp {
                op: BinaryOperator::Concat,
                ..
            }
        ));
    }

    #[test]
    fn test_null_comparison() {
        let e = expr_of(run(
            Lambda::new(|c: Sym| c.get("name").ne(Value::Null)),
            &[customer()],
        ));
        assert!(matches!(
            e,
            Expr::UnaryOp {
                op: UnaryOperator::IsNotNull,
                ..
            }
        ));
    }

    #[test]
    fn test_captured_becomes_parameter() {
        let e = expr_of(run(
            Lambda::new(|c: Sym| c.get("debt").gt(captured("minDebt", 250))),
            &[customer()],
        ));
        let debt = source(0, "Customer").field("debt", SemType::Numeric);
        assert_eq!(e, debt.gt(param("minDebt", 250)));
    }

    #[test]
    fn test_nested_pair_flattens_and_projects() {
        let e = expr_of(run(
            Lambda::new(|c: Sym| {
                c.get("name")
                    .pair(c.get("country"))
                    .pair(c.get("debt"))
                    .first()
                    .second()
            }),
            &[customer()],
        ));
        assert_eq!(
            e,
            source(0, "Customer").field("country", SemType::String)
        );
    }

    #[test]
    fn test_branch_keeps_arms() {
        let e = expr_of(run(
            Lambda::new(|c: Sym| c.get("debt").gt(100).if_else(0, c.get("debt"))),
            &[customer()],
        ));
        match e {
            Expr::Conditional { then, .. } => assert_eq!(*then, lit_int(0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_known_function() {
        let e = expr_of(run(Lambda::new(|c: Sym| c.get("name").to_upper()), &[customer()]));
        assert!(matches!(
            e,
            Expr::Function {
                func: ScalarFunction::Upper,
                ..
            }
        ));
    }

    #[test]
    fn test_discarded_external_call_poisons_result() {
        let external = ExternalFn::new("externalMethod", |_| Ok(Value::Null));
        let result = run(
            Lambda::new(move |c: Sym| {
                let _ = c.call(&external, Vec::<Value>::new());
                "blank"
            }),
            &[customer()],
        );
        assert_eq!(
            result.unsupported_reason(),
            Some("call to external function externalMethod")
        );
    }

    #[test]
    fn test_unknown_attribute_is_unsupported() {
        let result = run(Lambda::new(|c: Sym| c.get("age").gt(3)), &[customer()]);
        assert_eq!(
            result.unsupported_reason(),
            Some("Customer has no attribute age")
        );
    }

    #[test]
    fn test_collection_join_request() {
        let result = run(
            Lambda::new(|i: Sym| i.get("suppliers").stream()),
            &[Binding::Element(source(0, "Item"))],
        );
        assert_eq!(
            result,
            Interpreted::Join(JoinRequest::Path {
                parent: SourceId(0),
                path: vec!["suppliers".into()],
                entity: "Supplier".into(),
            })
        );
    }

    #[test]
    fn test_provider_join_request() {
        let result = run(
            Lambda::new2(|_i: Sym, source: Sym| source.stream_of("Item")),
            &[Binding::Element(source(0, "Item")), Binding::Provider],
        );
        assert_eq!(
            result,
            Interpreted::Join(JoinRequest::Root {
                entity: "Item".into()
            })
        );
    }

    #[test]
    fn test_string_equality() {
        let e = expr_of(run(
            Lambda::new(|i: Sym| i.get("name").eq("Widgets")),
            &[Binding::Element(source(0, "Item"))],
        ));
        assert_eq!(
            e,
            source(0, "Item")
                .field("name", SemType::String)
                .eq(lit_str("Widgets"))
        );
    }
}
