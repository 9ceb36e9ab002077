//! Integration tests for the `exceptionOnTranslationFail` policy and
//! client-side evaluation of clauses that do not translate.

mod common;

use common::{customers, executor, names, provider};
use querystream::prelude::*;

fn is_swiss() -> ExternalFn {
    ExternalFn::new("isSwiss", |args: &[Value]| {
        let country = args.first().and_then(|c| c.attribute("country"));
        Ok(Value::Bool(country.and_then(Value::as_str) == Some("Switzerland")))
    })
}

fn swiss_filter() -> Lambda {
    let is_swiss = is_swiss();
    Lambda::new(move |c: Sym| c.call(&is_swiss, Vec::<Value>::new()))
}

// ============================================================================
// Policy
// ============================================================================

#[test]
fn test_untranslatable_clause_raises_by_default() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .filter(swiss_filter());

    let err = stream.to_list().unwrap_err();
    assert!(
        matches!(
            err,
            QueryError::Translation(TranslationError::UnsupportedConstruct {
                clause: Clause::Where,
                ..
            })
        ),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(executor.acquired(), 0);
}

#[test]
fn test_untranslatable_clause_falls_back_when_allowed() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .filter(swiss_filter());

    // The reduced query is observable; the filter runs client-side.
    assert_eq!(stream.query_text().unwrap(), "SELECT A FROM Customer A");
    assert_eq!(stream.fallback_reasons().len(), 1);
    assert!(stream.fallback_reasons()[0].contains("isSwiss"));

    let results = stream.to_list().unwrap();
    assert_eq!(names(&results), vec!["Alice", "Bob"]);
}

#[test]
fn test_hints_from_provider_defaults() {
    let executor = executor();
    let provider = provider().with_hints(Hints {
        exception_on_translation_fail: false,
        ..Hints::default()
    });
    let stream = provider
        .stream_all(&executor, "Customer")
        .filter(swiss_filter());
    assert_eq!(names(&stream.to_list().unwrap()), vec!["Alice", "Bob"]);
}

#[test]
fn test_translated_prefix_still_runs_in_query() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .filter(Lambda::new(|c: Sym| c.get("debt").gt(150)))
        .filter(swiss_filter())
        .select(Lambda::new(|c: Sym| c.get("name")));

    let text = "SELECT A FROM Customer A WHERE A.debt > 150";
    assert_eq!(stream.query_text().unwrap(), text);
    executor.respond_values(
        text,
        customers()
            .into_iter()
            .filter(|c| c.attribute("debt").and_then(Value::as_int) > Some(150))
            .collect(),
    );
    let names: Vec<String> = stream.collect_as().unwrap();
    assert_eq!(names, vec!["Bob"]);
}

#[test]
fn test_client_side_tail_keeps_stream_semantics() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .select(Lambda::opaque(|c| {
            Ok(c.attribute("country").cloned().unwrap_or(Value::Null))
        }))
        .distinct()
        .sorted_by(Lambda::new(|country: Sym| country))
        .skip(1)
        .limit(2);

    assert_eq!(stream.query_text().unwrap(), "SELECT A FROM Customer A");
    let countries: Vec<String> = stream.collect_as().unwrap();
    assert_eq!(countries, vec!["Switzerland", "UK"]);
}

#[test]
fn test_executor_error_surfaces_through_fallback() {
    let executor = executor();
    let error = ExecutorError::rejected("SELECT A FROM Customer A", "database is down");
    executor.fail("SELECT A FROM Customer A", error.clone());

    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .filter(swiss_filter());
    assert_eq!(stream.to_list().unwrap_err(), QueryError::Executor(error));
    assert_eq!(executor.open_handles(), 0);
}

#[test]
fn test_fallback_evaluation_error_is_reported() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .select(Lambda::opaque(|_| Err(EvalError::external("explode", "always fails"))));
    assert!(matches!(
        stream.to_list(),
        Err(QueryError::Evaluation(EvalError::External { .. }))
    ));
}

#[test]
fn test_reenabling_exceptions_after_fallback_is_rejected() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(EXCEPTION_ON_TRANSLATION_FAIL, false)
        .unwrap()
        .filter(swiss_filter());
    assert!(matches!(
        stream.set_hint(EXCEPTION_ON_TRANSLATION_FAIL, true),
        Err(QueryError::InvalidHint { .. })
    ));
}
