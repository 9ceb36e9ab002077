//! Integration tests for projection: single attributes, arithmetic, tuples
//! and fused selects.

mod common;

use common::{executor, provider};
use querystream::prelude::*;

// ============================================================================
// Projection text
// ============================================================================

#[test]
fn test_select_single_attribute() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("country")));
    assert_eq!(stream.query_text().unwrap(), "SELECT A.country FROM Customer A");
}

#[test]
fn test_select_arithmetic_parenthesizes_product() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("debt") + c.get("salary") * 2));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A.debt + (A.salary * 2) FROM Customer A"
    );
}

#[test]
fn test_select_pair_keeps_order() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("name").pair(c.get("country"))));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A.name, A.country FROM Customer A"
    );
}

#[test]
fn test_select_nested_pair_flattens() {
    let executor = executor();
    let stream = provider().stream_all(&executor, "Customer").select(Lambda::new(|c: Sym| {
        c.get("name").pair(c.get("country")).pair(c.get("debt"))
    }));
    let text = stream.query_text().unwrap();
    assert_eq!(text, "SELECT A.name, A.country, A.debt FROM Customer A");

    executor.respond(
        text,
        vec![vec![Value::from("Alice"), Value::from("Switzerland"), Value::Int(100)]],
    );
    assert_eq!(
        stream.to_list().unwrap(),
        vec![Value::pair(Value::pair("Alice", "Switzerland"), 100i64)]
    );
}

#[test]
fn test_chained_select_fuses() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("debt")))
        .select(Lambda::new(|d: Sym| d * 2));
    assert_eq!(stream.query_text().unwrap(), "SELECT A.debt * 2 FROM Customer A");
}

#[test]
fn test_select_then_where_filters_projection() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("name").pair(c.get("debt"))))
        .r#where(Lambda::new(|p: Sym| p.second().gt(250)));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A.name, A.debt FROM Customer A WHERE A.debt > 250"
    );
}

#[test]
fn test_captured_value_becomes_parameter() {
    let executor = executor();
    let min_debt = 250;
    let stream = provider()
        .stream_all(&executor, "Customer")
        .filter(Lambda::new(move |c: Sym| c.get("debt").gt(captured("minDebt", min_debt))));
    let compiled = stream.compile().unwrap();
    assert_eq!(compiled.text, "SELECT A FROM Customer A WHERE A.debt > :minDebt");
    assert_eq!(compiled.params.get("minDebt"), Some(&Value::Int(250)));
}

#[test]
fn test_hql_concatenation() {
    let executor = executor();
    let select = Lambda::new(|c: Sym| c.get("name").concat("!"));

    let jpql = provider().stream_all(&executor, "Customer").select(select.clone());
    assert_eq!(
        jpql.query_text().unwrap(),
        "SELECT CONCAT(A.name, '!') FROM Customer A"
    );

    let hql = provider()
        .with_dialect(Dialect::Hql)
        .stream_all(&executor, "Customer")
        .select(select);
    assert_eq!(
        hql.query_text().unwrap(),
        "SELECT A.name || '!' FROM Customer A"
    );
}

// ============================================================================
// Aliases and ordering
// ============================================================================

#[test]
fn test_compilation_is_stable() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .join(Lambda::new(|i: Sym| i.get("suppliers").stream()))
        .filter(Lambda::new(|p: Sym| p.second().get("country").eq("USA")));

    let first = stream.compile().unwrap();
    let second = stream.compile().unwrap();
    assert_eq!(first.text, second.text);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(
        first.text,
        "SELECT A, B FROM Item A, A.suppliers B WHERE B.country = 'USA'"
    );
}

#[test]
fn test_later_sort_is_primary() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .sorted_by(Lambda::new(|c: Sym| c.get("name")))
        .sorted_descending_by(Lambda::new(|c: Sym| c.get("country")));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A FROM Customer A ORDER BY A.country DESC, A.name ASC"
    );
}

#[test]
fn test_select_results_in_order() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("name")));
    executor.respond_values(
        stream.query_text().unwrap(),
        vec![Value::from("Alice"), Value::from("Bob")],
    );
    let names: Vec<String> = stream.collect_as().unwrap();
    assert_eq!(names, vec!["Alice", "Bob"]);
}
