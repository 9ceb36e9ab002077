//! Shared fixtures for the pipeline tests: a small shop metamodel and sample
//! entities.

#![allow(dead_code)]

use querystream::prelude::*;

pub fn shop() -> Metamodel {
    Metamodel::new()
        .with_entity(
            EntityType::new("Customer")
                .scalar("name", ScalarType::String)
                .scalar("country", ScalarType::String)
                .scalar("debt", ScalarType::Numeric)
                .scalar("salary", ScalarType::Numeric),
        )
        .with_entity(
            EntityType::new("Item")
                .scalar("name", ScalarType::String)
                .scalar("purchaseprice", ScalarType::Numeric)
                .scalar("saleprice", ScalarType::Numeric)
                .collection("suppliers", "Supplier"),
        )
        .with_entity(
            EntityType::new("Supplier")
                .scalar("name", ScalarType::String)
                .scalar("country", ScalarType::String),
        )
        .with_entity(
            EntityType::new("Sale")
                .scalar("date", ScalarType::String)
                .reference("customer", "Customer"),
        )
        .with_entity(
            EntityType::new("Lineorder")
                .scalar("quantity", ScalarType::Numeric)
                .reference("sale", "Sale")
                .reference("item", "Item"),
        )
}

pub fn provider() -> StreamProvider {
    StreamProvider::new(shop())
}

pub fn customer(name: &str, country: &str, debt: i64, salary: i64) -> Value {
    Entity::new("Customer")
        .with("name", name)
        .with("country", country)
        .with("debt", debt)
        .with("salary", salary)
        .into()
}

pub fn customers() -> Vec<Value> {
    vec![
        customer("Alice", "Switzerland", 100, 200),
        customer("Bob", "Switzerland", 300, 250),
        customer("Carol", "USA", 200, 300),
        customer("Dave", "UK", 350, 120),
        customer("Eve", "Canada", 10, 50),
    ]
}

pub fn supplier(name: &str, country: &str) -> Value {
    Entity::new("Supplier")
        .with("name", name)
        .with("country", country)
        .into()
}

pub fn item(name: &str, purchaseprice: i64, suppliers: Vec<Value>) -> Value {
    Entity::new("Item")
        .with("name", name)
        .with("purchaseprice", purchaseprice)
        .with("saleprice", purchaseprice * 2)
        .with("suppliers", suppliers)
        .into()
}

pub fn items() -> Vec<Value> {
    vec![
        item(
            "Widgets",
            10,
            vec![supplier("HW Supplier", "Canada"), supplier("Conglomerate", "USA")],
        ),
        item("Screws", 1, vec![supplier("HW Supplier", "Canada")]),
        item("Lawnmowers", 100, vec![supplier("Conglomerate", "USA")]),
    ]
}

/// An executor that answers the full-scan query of every sample entity type.
pub fn executor() -> MemoryExecutor {
    let executor = MemoryExecutor::new().with_syntax_check();
    executor.respond_values("SELECT A FROM Customer A", customers());
    executor.respond_values("SELECT A FROM Item A", items());
    executor
}

pub fn names(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.attribute("name").and_then(Value::as_str).map(String::from))
        .collect()
}
