//! Integration tests for joins: navigation through to-many attributes and
//! independent root sources from the source provider.

mod common;

use common::{executor, items, provider, supplier};
use querystream::prelude::*;

#[test]
fn test_join_collection_attribute() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .filter(Lambda::new(|i: Sym| i.get("name").eq("Widgets")))
        .join(Lambda::new(|i: Sym| i.get("suppliers").stream()));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A, B FROM Item A, A.suppliers B WHERE A.name = 'Widgets'"
    );
}

#[test]
fn test_join_through_association_chain() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Lineorder")
        .filter(Lambda::new(|l: Sym| {
            l.get("sale").get("customer").get("name").eq("Alice")
        }))
        .join(Lambda::new(|l: Sym| l.get("item").get("suppliers").stream()));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A, B FROM Lineorder A, A.item.suppliers B WHERE A.sale.customer.name = 'Alice'"
    );
}

#[test]
fn test_join_independent_root() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .filter(Lambda::new(|i: Sym| i.get("name").eq("Widgets")))
        .join(Lambda::new2(|_i: Sym, source: Sym| source.stream_of("Item")))
        .filter(Lambda::new(|p: Sym| {
            p.first()
                .get("purchaseprice")
                .lt(p.second().get("purchaseprice"))
        }));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A, B FROM Item A, Item B WHERE A.name = 'Widgets' AND (A.purchaseprice < (B.purchaseprice))"
    );
}

#[test]
fn test_join_yields_pairs() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .filter(Lambda::new(|i: Sym| i.get("name").eq("Widgets")))
        .join(Lambda::new(|i: Sym| i.get("suppliers").stream()))
        .select(Lambda::new(|p: Sym| p.second().get("name")));
    let text = stream.query_text().unwrap();
    assert_eq!(
        text,
        "SELECT B.name FROM Item A, A.suppliers B WHERE A.name = 'Widgets'"
    );

    executor.respond_values(
        text,
        vec![Value::from("HW Supplier"), Value::from("Conglomerate")],
    );
    let suppliers: Vec<String> = stream.collect_as().unwrap();
    assert_eq!(suppliers, vec!["HW Supplier", "Conglomerate"]);
}

#[test]
fn test_join_rows_assemble_into_pairs() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .join(Lambda::new(|i: Sym| i.get("suppliers").stream()));
    let widgets = items().remove(0);
    executor.respond(
        stream.query_text().unwrap(),
        vec![vec![widgets.clone(), supplier("HW Supplier", "Canada")]],
    );
    assert_eq!(
        stream.to_list().unwrap(),
        vec![Value::pair(widgets, supplier("HW Supplier", "Canada"))]
    );
}

#[test]
fn test_join_on_scalar_attribute_is_unsupported() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .join(Lambda::new(|i: Sym| i.get("name")));
    assert!(matches!(
        stream.to_list(),
        Err(QueryError::Translation(TranslationError::UnsupportedConstruct {
            clause: Clause::Join,
            ..
        }))
    ));
}

#[test]
fn test_join_after_opaque_filter_runs_client_side() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .filter(Lambda::opaque(|i| {
            Ok(Value::Bool(
                i.attribute("name").and_then(Value::as_str) == Some("Screws"),
            ))
        }))
        .join(Lambda::new(|i: Sym| i.get("suppliers").stream()));
    assert_eq!(stream.query_text().unwrap(), "SELECT A FROM Item A");

    let pairs = stream.to_list().unwrap();
    assert_eq!(pairs.len(), 1);
    let pair = &pairs[0];
    assert_eq!(
        pair.element(0).and_then(|i| i.attribute("name")),
        Some(&Value::from("Screws"))
    );
    assert_eq!(pair.element(1), Some(&supplier("HW Supplier", "Canada")));
}

#[test]
fn test_two_argument_join_runs_client_side() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Item")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .limit(1)
        .join(Lambda::new2(|_i: Sym, source: Sym| source.stream_of("Item")));

    // The provider stream is loaded once, then paired with the first item.
    let pairs = stream.to_list().unwrap();
    assert_eq!(pairs.len(), 3);
    let windows: Vec<Window> = executor.fetches().iter().map(|f| f.window).collect();
    assert_eq!(
        windows,
        vec![Window { skip: 0, limit: Some(1) }, Window::default()]
    );
}
