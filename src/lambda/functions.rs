//! Registry of library functions with a query-language equivalent.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::sql::expr::ScalarFunction;
use crate::value::Value;

use super::eval::EvalError;

static KNOWN: Lazy<HashMap<&'static str, ScalarFunction>> = Lazy::new(|| {
    HashMap::from([
        ("abs", ScalarFunction::Abs),
        ("Math.abs", ScalarFunction::Abs),
        ("sqrt", ScalarFunction::Sqrt),
        ("Math.sqrt", ScalarFunction::Sqrt),
        ("upper", ScalarFunction::Upper),
        ("toUpperCase", ScalarFunction::Upper),
        ("to_uppercase", ScalarFunction::Upper),
        ("lower", ScalarFunction::Lower),
        ("toLowerCase", ScalarFunction::Lower),
        ("to_lowercase", ScalarFunction::Lower),
        ("trim", ScalarFunction::Trim),
        ("length", ScalarFunction::Length),
        ("len", ScalarFunction::Length),
    ])
});

/// Look up a registered single-argument function by name.
pub fn known_function(name: &str) -> Option<ScalarFunction> {
    KNOWN.get(name).copied()
}

/// Evaluate a known function over a concrete argument.
pub fn apply_known(func: ScalarFunction, arg: &Value) -> Result<Value, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        operation: func.name().to_string(),
        found: arg.kind(),
    };
    match func {
        ScalarFunction::Abs => match arg {
            Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Null => Ok(Value::Null),
            _ => Err(mismatch()),
        },
        ScalarFunction::Sqrt => match arg {
            Value::Null => Ok(Value::Null),
            other => other
                .as_float()
                .map(|f| Value::Float(f.sqrt()))
                .ok_or_else(mismatch),
        },
        ScalarFunction::Upper => string_map(arg, str::to_uppercase).ok_or_else(mismatch),
        ScalarFunction::Lower => string_map(arg, str::to_lowercase).ok_or_else(mismatch),
        ScalarFunction::Trim => string_map(arg, |s| s.trim().to_string()).ok_or_else(mismatch),
        ScalarFunction::Length => match arg {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::Null => Ok(Value::Null),
            _ => Err(mismatch()),
        },
    }
}

fn string_map(arg: &Value, f: impl Fn(&str) -> String) -> Option<Value> {
    match arg {
        Value::String(s) => Some(Value::String(f(s))),
        Value::Null => Some(Value::Null),
        _ => None,
    }
}
