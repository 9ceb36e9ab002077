//! Integration tests for count, sum, min, max and avg, both in the query and
//! folded client-side.

mod common;

use common::{customers, executor, provider};
use querystream::prelude::*;

#[test]
fn test_count_runs_in_query() {
    let executor = executor();
    executor.respond_values(
        "SELECT COUNT(A) FROM Customer A WHERE A.debt > 150",
        vec![Value::Int(3)],
    );
    let count = provider()
        .stream_all(&executor, "Customer")
        .filter(Lambda::new(|c: Sym| c.get("debt").gt(150)))
        .count()
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        executor.queries(),
        vec!["SELECT COUNT(A) FROM Customer A WHERE A.debt > 150"]
    );
}

#[test]
fn test_sum_runs_in_query() {
    let executor = executor();
    executor.respond_values("SELECT SUM(A.debt) FROM Customer A", vec![Value::Int(960)]);
    let sum = provider()
        .stream_all(&executor, "Customer")
        .sum(Lambda::new(|c: Sym| c.get("debt")))
        .unwrap();
    assert_eq!(sum, Value::Int(960));
}

#[test]
fn test_max_over_projection() {
    let executor = executor();
    executor.respond_values(
        "SELECT MAX(A.salary * 2) FROM Customer A",
        vec![Value::Int(600)],
    );
    let max = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("salary") * 2))
        .max(Lambda::new(|s: Sym| s))
        .unwrap();
    assert_eq!(max, Value::Int(600));
}

#[test]
fn test_aggregate_after_limit_folds_client_side() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .limit(2);

    assert_eq!(stream.sum(Lambda::new(|c: Sym| c.get("debt"))).unwrap(), Value::Int(400));
    assert_eq!(stream.min(Lambda::new(|c: Sym| c.get("debt"))).unwrap(), Value::Int(100));
    assert_eq!(stream.count().unwrap(), 2);
}

#[test]
fn test_aggregate_after_limit_raises_by_default() {
    let executor = executor();
    let err = provider()
        .stream_all(&executor, "Customer")
        .limit(2)
        .sum(Lambda::new(|c: Sym| c.get("debt")))
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Translation(TranslationError::UnsupportedConstruct {
            clause: Clause::Aggregate,
            ..
        })
    ));
}

#[test]
fn test_avg_over_residual() {
    let executor = executor();
    let avg = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .select(Lambda::opaque(|c| Ok(c.attribute("salary").cloned().unwrap_or(Value::Null))))
        .avg(Lambda::new(|s: Sym| s))
        .unwrap();
    // (200 + 250 + 300 + 120 + 50) / 5
    assert_eq!(avg, Value::Float(184.0));
}

#[test]
fn test_sum_of_empty_stream_is_null() {
    let executor = executor();
    let sum = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .skip(10)
        .sum(Lambda::new(|c: Sym| c.get("debt")))
        .unwrap();
    assert_eq!(sum, Value::Null);
}

#[test]
fn test_sum_of_string_is_a_type_error() {
    let executor = executor();
    let err = provider()
        .stream_all(&executor, "Customer")
        .sum(Lambda::new(|c: Sym| c.get("name")))
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Translation(TranslationError::UnsupportedConstruct { .. })
    ));
    assert_eq!(executor.acquired(), 0);
}

#[test]
fn test_count_includes_null_elements() {
    let executor = MemoryExecutor::new().with_syntax_check();
    let mut rows = customers();
    rows.push(
        Entity::new("Customer")
            .with("name", "Frank")
            .with("country", Value::Null)
            .into(),
    );
    executor.respond_values("SELECT A FROM Customer A", rows);
    executor.respond_values("SELECT COUNT(A) FROM Customer A", vec![Value::Int(6)]);

    let in_query = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("country")))
        .count()
        .unwrap();
    assert_eq!(executor.queries(), vec!["SELECT COUNT(A) FROM Customer A"]);

    let client_side = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .select(Lambda::opaque(|c| Ok(c.attribute("country").cloned().unwrap_or(Value::Null))))
        .count()
        .unwrap();
    assert_eq!(in_query, 6);
    assert_eq!(client_side, in_query);
}

#[test]
fn test_distinct_pair_count_does_not_use_first_column() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("country").pair(c.get("name"))))
        .distinct();
    let err = stream.count().unwrap_err();
    assert!(matches!(
        err,
        QueryError::Translation(TranslationError::UnsupportedConstruct {
            clause: Clause::Aggregate,
            ..
        })
    ));
    assert_eq!(executor.acquired(), 0);

    executor.respond(
        "SELECT DISTINCT A.country, A.name FROM Customer A",
        vec![
            vec![Value::from("Switzerland"), Value::from("Alice")],
            vec![Value::from("Switzerland"), Value::from("Bob")],
            vec![Value::from("USA"), Value::from("Carol")],
        ],
    );
    let count = stream
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .count()
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        executor.queries(),
        vec!["SELECT DISTINCT A.country, A.name FROM Customer A"]
    );
}
