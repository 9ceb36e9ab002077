//! Traversals over expression trees.

use std::collections::BTreeSet;

use crate::sql::expr::{Expr, SourceId};
use crate::value::Value;

/// Visit every node, parents before children.
pub fn walk<'e>(expr: &'e Expr, f: &mut impl FnMut(&'e Expr)) {
    f(expr);
    match expr {
        Expr::FieldAccess { base, .. } => walk(base, f),
        Expr::BinaryOp { left, right, .. } => {
            walk(left, f);
            walk(right, f);
        }
        Expr::UnaryOp { expr, .. } => walk(expr, f),
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            walk(cond, f);
            walk(then, f);
            walk(otherwise, f);
        }
        Expr::Tuple { elements, .. } => elements.iter().for_each(|e| walk(e, f)),
        Expr::Aggregate { arg, .. } => walk(arg, f),
        Expr::Function { args, .. } => args.iter().for_each(|e| walk(e, f)),
        Expr::Constant(_)
        | Expr::Parameter { .. }
        | Expr::SourceRef { .. }
        | Expr::Unsupported { .. } => {}
    }
}

/// Sources an expression refers to.
pub fn referenced_sources(expr: &Expr) -> BTreeSet<SourceId> {
    let mut found = BTreeSet::new();
    walk(expr, &mut |e| {
        if let Expr::SourceRef { source, .. } = e {
            found.insert(*source);
        }
    });
    found
}

/// Reason of the first unsupported node, in pre-order.
pub fn first_unsupported(expr: &Expr) -> Option<&str> {
    let mut reason = None;
    walk(expr, &mut |e| {
        if reason.is_none() {
            if let Expr::Unsupported { reason: r } = e {
                reason = Some(r.as_str());
            }
        }
    });
    reason
}

/// Named parameters in order of first appearance.
pub fn parameters(expr: &Expr) -> Vec<(&str, &Value)> {
    let mut found: Vec<(&str, &Value)> = Vec::new();
    walk(expr, &mut |e| {
        if let Expr::Parameter { name, value } = e {
            if !found.iter().any(|(n, v)| *n == name && *v == value) {
                found.push((name.as_str(), value));
            }
        }
    });
    found
}
