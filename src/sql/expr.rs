//! Expression tree - the IR for scalar and boolean computations over query
//! sources.
//!
//! Every node carries (or derives) a semantic type tag, exposed through
//! [`Expr::ty`]. The emitter in [`super::emit`] turns these trees into query
//! text; the interpreter in [`crate::interp`] builds them.

use serde::{Deserialize, Serialize};

use crate::value::Value;

// =============================================================================
// Type tags
// =============================================================================

/// Semantic type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemType {
    Boolean,
    Numeric,
    String,
    /// An entity of the named type.
    Entity(String),
    /// A to-many relationship to the named entity type.
    Collection(String),
    Tuple,
    /// Null literals and unsupported markers.
    Unknown,
}

impl SemType {
    /// Whether values of this type can appear as a single projected column.
    pub fn is_scalar(&self) -> bool {
        matches!(self, SemType::Boolean | SemType::Numeric | SemType::String)
    }

    pub fn entity_name(&self) -> Option<&str> {
        match self {
            SemType::Entity(name) => Some(name),
            _ => None,
        }
    }
}

// =============================================================================
// Expression AST
// =============================================================================

/// Position of a source in the FROM clause. Aliases are derived from it at
/// emission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub usize);

/// Nesting structure of a flattened tuple.
///
/// `pair(pair(a, b), c)` is stored as the leaves `[a, b, c]` with the shape
/// `Group([Group([Leaf, Leaf]), Leaf])`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupleShape {
    Leaf,
    Group(Vec<TupleShape>),
}

impl TupleShape {
    /// Number of leaf columns covered by this shape.
    pub fn width(&self) -> usize {
        match self {
            TupleShape::Leaf => 1,
            TupleShape::Group(parts) => parts.iter().map(TupleShape::width).sum(),
        }
    }
}

/// A query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Inline literal.
    Constant(Literal),

    /// Named captured value, emitted as `:name`.
    Parameter { name: String, value: Value },

    /// A FROM-clause source.
    SourceRef { source: SourceId, entity: String },

    /// Navigation: `base.path[0].path[1]...`
    FieldAccess {
        base: Box<Expr>,
        path: Vec<String>,
        ty: SemType,
    },

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation: op expr
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// cond ? then : otherwise
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// Flattened tuple: leaf columns in construction order plus their nesting.
    Tuple {
        elements: Vec<Expr>,
        shape: TupleShape,
    },

    /// COUNT(x), SUM(x), ...
    Aggregate {
        kind: AggregateKind,
        arg: Box<Expr>,
        distinct: bool,
    },

    /// Known scalar library function.
    Function {
        func: ScalarFunction,
        args: Vec<Expr>,
    },

    /// Sentinel for a construct that could not be translated.
    Unsupported { reason: String },
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// Scalar values become literals; entities, lists, tuples and
    /// non-finite floats do not.
    pub fn from_value(value: &Value) -> Option<Literal> {
        match value {
            Value::Null => Some(Literal::Null),
            Value::Bool(b) => Some(Literal::Bool(*b)),
            Value::Int(n) => Some(Literal::Int(*n)),
            Value::Float(f) if f.is_finite() => Some(Literal::Float(*f)),
            Value::Float(_) => None,
            Value::String(s) => Some(Literal::String(s.clone())),
            Value::Entity(_) | Value::List(_) | Value::Tuple(_) => None,
        }
    }

    pub fn ty(&self) -> SemType {
        match self {
            Literal::Int(_) | Literal::Float(_) => SemType::Numeric,
            Literal::String(_) => SemType::String,
            Literal::Bool(_) => SemType::Boolean,
            Literal::Null => SemType::Unknown,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    // String
    Concat,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq
            | BinaryOperator::Ne
            | BinaryOperator::Lt
            | BinaryOperator::Gt
            | BinaryOperator::Lte
            | BinaryOperator::Gte => 4,
            BinaryOperator::Plus | BinaryOperator::Minus | BinaryOperator::Concat => 5,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 6,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Lte
                | BinaryOperator::Gte
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }

    /// Operator symbol, for diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Concat => "concat",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    IsNull,
    IsNotNull,
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateKind {
    pub fn name(self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::Avg => "AVG",
        }
    }
}

/// Scalar functions the query language understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarFunction {
    Abs,
    Sqrt,
    Upper,
    Lower,
    Trim,
    Length,
}

impl ScalarFunction {
    pub fn name(self) -> &'static str {
        match self {
            ScalarFunction::Abs => "ABS",
            ScalarFunction::Sqrt => "SQRT",
            ScalarFunction::Upper => "UPPER",
            ScalarFunction::Lower => "LOWER",
            ScalarFunction::Trim => "TRIM",
            ScalarFunction::Length => "LENGTH",
        }
    }

    /// Argument type the function accepts.
    pub fn arg_type(self) -> SemType {
        match self {
            ScalarFunction::Abs | ScalarFunction::Sqrt => SemType::Numeric,
            ScalarFunction::Upper
            | ScalarFunction::Lower
            | ScalarFunction::Trim
            | ScalarFunction::Length => SemType::String,
        }
    }

    pub fn result_type(self) -> SemType {
        match self {
            ScalarFunction::Abs | ScalarFunction::Sqrt | ScalarFunction::Length => {
                SemType::Numeric
            }
            ScalarFunction::Upper | ScalarFunction::Lower | ScalarFunction::Trim => {
                SemType::String
            }
        }
    }
}

// =============================================================================
// Typing and structure
// =============================================================================

impl Expr {
    /// Semantic type tag of this node.
    pub fn ty(&self) -> SemType {
        match self {
            Expr::Constant(lit) => lit.ty(),
            Expr::Parameter { value, .. } => Literal::from_value(value)
                .map(|lit| lit.ty())
                .unwrap_or(SemType::Unknown),
            Expr::SourceRef { entity, .. } => SemType::Entity(entity.clone()),
            Expr::FieldAccess { ty, .. } => ty.clone(),
            Expr::BinaryOp { op, .. } => {
                if op.is_comparison() || op.is_logical() {
                    SemType::Boolean
                } else if *op == BinaryOperator::Concat {
                    SemType::String
                } else {
                    SemType::Numeric
                }
            }
            Expr::UnaryOp { op, .. } => match op {
                UnaryOperator::Minus => SemType::Numeric,
                UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                    SemType::Boolean
                }
            },
            Expr::Conditional {
                then, otherwise, ..
            } => match then.ty() {
                SemType::Unknown => otherwise.ty(),
                ty => ty,
            },
            Expr::Tuple { .. } => SemType::Tuple,
            Expr::Aggregate { kind, arg, .. } => match kind {
                AggregateKind::Count | AggregateKind::Sum | AggregateKind::Avg => {
                    SemType::Numeric
                }
                AggregateKind::Min | AggregateKind::Max => arg.ty(),
            },
            Expr::Function { func, .. } => func.result_type(),
            Expr::Unsupported { .. } => SemType::Unknown,
        }
    }

    /// Literals and parameters: the operands that never need parentheses.
    pub fn is_leaf_value(&self) -> bool {
        matches!(self, Expr::Constant(_) | Expr::Parameter { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Expr::Unsupported { .. })
    }

    /// Build a tuple, splicing nested tuples into one leaf sequence.
    pub fn tuple(items: Vec<Expr>) -> Expr {
        let mut elements = Vec::new();
        let mut shapes = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Expr::Tuple {
                    elements: inner,
                    shape,
                } => {
                    elements.extend(inner);
                    shapes.push(shape);
                }
                other => {
                    elements.push(other);
                    shapes.push(TupleShape::Leaf);
                }
            }
        }
        Expr::Tuple {
            elements,
            shape: TupleShape::Group(shapes),
        }
    }

    /// Project the `index`-th component out of a tuple, respecting nesting.
    ///
    /// Returns `None` if this is not a tuple or the index is out of range.
    pub fn element(&self, index: usize) -> Option<Expr> {
        let Expr::Tuple {
            elements,
            shape: TupleShape::Group(parts),
        } = self
        else {
            return None;
        };
        let part = parts.get(index)?;
        let offset: usize = parts[..index].iter().map(TupleShape::width).sum();
        match part {
            TupleShape::Leaf => elements.get(offset).cloned(),
            TupleShape::Group(_) => Some(Expr::Tuple {
                elements: elements.get(offset..offset + part.width())?.to_vec(),
                shape: part.clone(),
            }),
        }
    }

    /// Read an attribute, compressing chains into one path.
    ///
    /// `source.customer` followed by `.name` yields a single
    /// `FieldAccess { path: [customer, name] }`.
    pub fn navigate(self, attribute: &str, ty: SemType) -> Expr {
        match self {
            Expr::FieldAccess { base, mut path, .. } => {
                path.push(attribute.into());
                Expr::FieldAccess { base, path, ty }
            }
            base => Expr::FieldAccess {
                base: Box::new(base),
                path: vec![attribute.into()],
                ty,
            },
        }
    }

    /// Columns this expression occupies in a projection list.
    pub fn columns(&self) -> Vec<&Expr> {
        match self {
            Expr::Tuple { elements, .. } => elements.iter().collect(),
            other => vec![other],
        }
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Reference a FROM-clause source.
pub fn source(id: usize, entity: &str) -> Expr {
    Expr::SourceRef {
        source: SourceId(id),
        entity: entity.into(),
    }
}

/// Create an integer literal.
pub fn lit_int(n: i64) -> Expr {
    Expr::Constant(Literal::Int(n))
}

/// Create a float literal.
pub fn lit_float(f: f64) -> Expr {
    Expr::Constant(Literal::Float(f))
}

/// Create a string literal.
pub fn lit_str(s: &str) -> Expr {
    Expr::Constant(Literal::String(s.into()))
}

/// Create a boolean literal.
pub fn lit_bool(b: bool) -> Expr {
    Expr::Constant(Literal::Bool(b))
}

/// Create a NULL literal.
pub fn lit_null() -> Expr {
    Expr::Constant(Literal::Null)
}

/// Create a named parameter.
pub fn param(name: &str, value: impl Into<Value>) -> Expr {
    Expr::Parameter {
        name: name.into(),
        value: value.into(),
    }
}

/// Create an aggregate call.
pub fn aggregate(kind: AggregateKind, arg: Expr) -> Expr {
    Expr::Aggregate {
        kind,
        arg: Box::new(arg),
        distinct: false,
    }
}

/// Conjunction of all predicates, left-nested in order. `None` when empty.
pub fn and_all(predicates: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    predicates.into_iter().reduce(|acc, p| acc.and(p))
}

// =============================================================================
// Expression Builder Trait
// =============================================================================

/// Extension trait for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn binary(self, op: BinaryOperator, other: impl Into<Expr>) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self.into_expr()),
            op,
            right: Box::new(other.into()),
        }
    }

    // Comparison operators
    fn eq(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Eq, other)
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Ne, other)
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Gt, other)
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Gte, other)
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Lt, other)
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Lte, other)
    }

    // Logical operators
    fn and(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::And, other)
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Or, other)
    }

    fn not(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.into_expr()),
        }
    }

    fn neg(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: Box::new(self.into_expr()),
        }
    }

    // Arithmetic operators
    fn add(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Plus, other)
    }

    fn sub(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Minus, other)
    }

    fn mul(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Mul, other)
    }

    fn div(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Div, other)
    }

    // NULL checks
    #[allow(clippy::wrong_self_convention)]
    fn is_null(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::IsNull,
            expr: Box::new(self.into_expr()),
        }
    }

    /// Read an attribute (test and builder convenience).
    fn field(self, attribute: &str, ty: SemType) -> Expr {
        self.into_expr().navigate(attribute, ty)
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        lit_int(n as i64)
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        lit_float(f)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}

// =============================================================================
// Tests
// =============================================================================
