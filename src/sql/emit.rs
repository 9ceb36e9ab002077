//! Query text emission.
//!
//! ```text
//! SELECT [DISTINCT] <projection>
//! FROM <source0> A[, <source1> B ...]
//! [WHERE <predicate>]
//! [ORDER BY <key> ASC|DESC, ...]
//! ```
//!
//! Parenthesization: a left operand is wrapped when its operator binds less
//! tightly than its parent's; a right operand is wrapped unless it is a literal
//! or a parameter; `NOT` always wraps its operand.
//!
//! Booleans are emitted differently depending on position. In a predicate
//! position (WHERE, CASE conditions, AND/OR/NOT operands) a bare boolean value
//! becomes `x = TRUE` and a boolean branch becomes its AND/OR expansion; in a
//! value position a comparison becomes `CASE WHEN ... THEN TRUE ELSE FALSE END`.

use super::dialect::{Dialect, QueryDialect};
use super::expr::{
    lit_bool, lit_int, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
use super::query::{QueryModel, SortDir, SourceOrigin};
use super::token::{Token, TokenStream};

/// Two-letter words that are never used as aliases.
const RESERVED_ALIASES: &[&str] = &["AS", "BY", "IN", "IS", "OF", "ON", "OR", "TO"];

/// The `n`-th name in the sequence `A..Z, AA, AB, ...` (bijective base 26).
fn alias_name(mut n: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Aliases for `count` sources, in source order.
pub fn aliases(count: usize) -> Vec<String> {
    (0..)
        .map(alias_name)
        .filter(|name| !RESERVED_ALIASES.contains(&name.as_str()))
        .take(count)
        .collect()
}

/// Emit the full query text for a model.
pub fn emit(model: &QueryModel, dialect: Dialect) -> TokenStream {
    Emitter::new(model, dialect).query()
}

/// Emit the full query as a string.
pub fn to_text(model: &QueryModel, dialect: Dialect) -> String {
    emit(model, dialect).serialize(dialect)
}

struct Emitter<'q> {
    model: &'q QueryModel,
    dialect: Dialect,
    aliases: Vec<String>,
}

impl<'q> Emitter<'q> {
    fn new(model: &'q QueryModel, dialect: Dialect) -> Self {
        Self {
            model,
            dialect,
            aliases: aliases(model.sources().len()),
        }
    }

    fn alias(&self, index: usize) -> Token {
        Token::Alias(self.aliases.get(index).cloned().unwrap_or_default())
    }

    fn query(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        // SELECT
        ts.push(Token::Select).space();
        if self.model.is_distinct() {
            ts.push(Token::Distinct).space();
        }
        match self.model.projection() {
            Some(projection) => {
                for (i, column) in projection.columns().into_iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    self.value(column, &mut ts);
                }
            }
            None => {
                ts.push(self.alias(0));
            }
        }

        // FROM
        ts.space().push(Token::From).space();
        for (i, origin) in self.model.sources().iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            match origin {
                SourceOrigin::Root { entity } => {
                    ts.push(Token::EntityName(entity.clone()));
                }
                SourceOrigin::Path { parent, path, .. } => {
                    ts.push(self.alias(parent.0));
                    for segment in path {
                        ts.push(Token::Dot).push(Token::Attribute(segment.clone()));
                    }
                }
            }
            ts.space().push(self.alias(i));
        }

        // WHERE
        if let Some(predicate) = self.model.predicate() {
            ts.space().push(Token::Where).space();
            self.predicate(predicate, &mut ts);
        }

        // ORDER BY
        if !self.model.ordering().is_empty() {
            ts.space().push(Token::OrderBy).space();
            for (i, key) in self.model.ordering().iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                self.value(&key.expr, &mut ts);
                ts.space().push(match key.dir {
                    SortDir::Asc => Token::Asc,
                    SortDir::Desc => Token::Desc,
                });
            }
        }

        ts
    }

    // -------------------------------------------------------------------------
    // Predicate position
    // -------------------------------------------------------------------------

    fn predicate(&self, expr: &Expr, ts: &mut TokenStream) {
        self.emit_predicate_form(&predicate_form(expr), ts);
    }

    /// Emit an expression already rewritten by [`predicate_form`].
    fn emit_predicate_form(&self, expr: &Expr, ts: &mut TokenStream) {
        match expr {
            Expr::BinaryOp { left, op, right } if op.is_logical() => {
                self.binary(left, *op, right, ts, Self::emit_predicate_form);
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => {
                ts.push(Token::Not).space().lparen();
                self.emit_predicate_form(expr, ts);
                ts.rparen();
            }
            other => self.plain(other, ts),
        }
    }

    // -------------------------------------------------------------------------
    // Value position
    // -------------------------------------------------------------------------

    fn value(&self, expr: &Expr, ts: &mut TokenStream) {
        if is_predicate_node(expr) {
            ts.push(Token::Case).space().push(Token::When).space();
            self.predicate(expr, ts);
            ts.space().push(Token::Then).space().push(Token::LitBool(true));
            ts.space().push(Token::Else).space().push(Token::LitBool(false));
            ts.space().push(Token::End);
        } else {
            self.plain(expr, ts);
        }
    }

    /// Emit a node whose operands are all in value position.
    fn plain(&self, expr: &Expr, ts: &mut TokenStream) {
        match expr {
            Expr::Constant(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::Float(f) => Token::LitFloat(*f),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::Parameter { name, .. } => {
                ts.push(Token::Parameter(name.clone()));
            }

            Expr::SourceRef { source, .. } => {
                ts.push(self.alias(source.0));
            }

            Expr::FieldAccess { base, path, .. } => {
                self.value(base, ts);
                for segment in path {
                    ts.push(Token::Dot).push(Token::Attribute(segment.clone()));
                }
            }

            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::Mod => self.call("MOD", &[left, right], ts),
                BinaryOperator::Concat if !self.dialect.supports_concat_operator() => {
                    self.call("CONCAT", &[left, right], ts)
                }
                op if op.is_logical() => self.value(expr, ts),
                _ => self.binary(left, *op, right, ts, Self::value),
            },

            Expr::UnaryOp { op, expr: operand } => match op {
                UnaryOperator::Minus => {
                    ts.push(Token::Minus);
                    self.wrapped(operand, wrap_after_minus(operand), ts);
                }
                UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                    self.wrapped(operand, matches!(**operand, Expr::BinaryOp { .. }), ts);
                    ts.space().push(match op {
                        UnaryOperator::IsNull => Token::IsNull,
                        _ => Token::IsNotNull,
                    });
                }
                UnaryOperator::Not => self.value(expr, ts),
            },

            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                ts.push(Token::Case).space().push(Token::When).space();
                self.predicate(cond, ts);
                ts.space().push(Token::Then).space();
                self.value(then, ts);
                ts.space().push(Token::Else).space();
                self.value(otherwise, ts);
                ts.space().push(Token::End);
            }

            Expr::Tuple { elements, .. } => {
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    self.value(element, ts);
                }
            }

            Expr::Aggregate {
                kind,
                arg,
                distinct,
            } => {
                ts.push(Token::FunctionName(kind.name().into())).lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                self.value(arg, ts);
                ts.rparen();
            }

            Expr::Function { func, args } => {
                let args: Vec<&Expr> = args.iter().collect();
                self.call(func.name(), &args, ts);
            }

            // Rejected by QueryModel::validate before emission.
            Expr::Unsupported { .. } => {
                ts.push(Token::LitNull);
            }
        }
    }

    fn call(&self, name: &str, args: &[&Expr], ts: &mut TokenStream) {
        ts.push(Token::FunctionName(name.into())).lparen();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            self.value(arg, ts);
        }
        ts.rparen();
    }

    fn binary(
        &self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
        ts: &mut TokenStream,
        operand: fn(&Self, &Expr, &mut TokenStream),
    ) {
        let wrap_left = matches!(left, Expr::BinaryOp { op: inner, .. } if inner.precedence() < op.precedence());
        let wrap_right = !right.is_leaf_value();

        if wrap_left {
            ts.lparen();
        }
        operand(self, left, ts);
        if wrap_left {
            ts.rparen();
        }
        ts.space().push(operator_token(op)).space();
        if wrap_right {
            ts.lparen();
        }
        operand(self, right, ts);
        if wrap_right {
            ts.rparen();
        }
    }

    fn wrapped(&self, expr: &Expr, wrap: bool, ts: &mut TokenStream) {
        if wrap {
            ts.lparen();
        }
        self.value(expr, ts);
        if wrap {
            ts.rparen();
        }
    }
}

fn operator_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
        BinaryOperator::Concat => Token::Concat,
        // Emitted as MOD(a, b) before reaching here.
        BinaryOperator::Mod => Token::FunctionName("MOD".into()),
    }
}

/// Operands of a unary minus that are parenthesized. A second `-` right after
/// the first would start a `--` comment.
fn wrap_after_minus(expr: &Expr) -> bool {
    match expr {
        Expr::BinaryOp { .. } | Expr::UnaryOp { .. } => true,
        Expr::Constant(Literal::Int(n)) => *n < 0,
        Expr::Constant(Literal::Float(f)) => f.is_sign_negative(),
        _ => false,
    }
}

/// Nodes that are conditions rather than values.
fn is_predicate_node(expr: &Expr) -> bool {
    match expr {
        Expr::BinaryOp { op, .. } => op.is_comparison() || op.is_logical(),
        Expr::UnaryOp { op, .. } => matches!(
            op,
            UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull
        ),
        _ => false,
    }
}

/// Rewrite a boolean expression so every leaf is a condition.
fn predicate_form(expr: &Expr) -> Expr {
    match expr {
        Expr::BinaryOp { left, op, right } if op.is_logical() => Expr::BinaryOp {
            left: Box::new(predicate_form(left)),
            op: *op,
            right: Box::new(predicate_form(right)),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => predicate_form(expr).not(),
        e if is_predicate_node(e) => e.clone(),
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            let cond = predicate_form(cond);
            let taken = cond.clone().and(predicate_form(then));
            let skipped = cond.not().and(predicate_form(otherwise));
            taken.or(skipped)
        }
        Expr::Constant(Literal::Bool(b)) => lit_int(1).eq(lit_int(if *b { 1 } else { 0 })),
        other => other.clone().eq(lit_bool(true)),
    }
}

// =============================================================================
// Tests
// =============================================================================
