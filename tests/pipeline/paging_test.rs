//! Integration tests for lazy iteration and `automaticPageSize` paging.

mod common;

use common::{executor, names, provider};
use querystream::prelude::*;

#[test]
fn test_single_fetch_without_page_size() {
    let executor = executor();
    let results = provider().stream_all(&executor, "Customer").to_list().unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(executor.fetches().len(), 1);
    assert_eq!(executor.acquired(), 1);
    assert_eq!(executor.released(), 1);
}

#[test]
fn test_page_size_splits_fetches() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(AUTOMATIC_PAGE_SIZE, 2)
        .unwrap();
    let results = stream.to_list().unwrap();
    assert_eq!(
        names(&results),
        vec!["Alice", "Bob", "Carol", "Dave", "Eve"]
    );

    let windows: Vec<Window> = executor.fetches().iter().map(|f| f.window).collect();
    assert_eq!(
        windows,
        vec![
            Window { skip: 0, limit: Some(2) },
            Window { skip: 2, limit: Some(2) },
            Window { skip: 4, limit: Some(2) },
        ]
    );
    // One handle for the whole iteration.
    assert_eq!(executor.acquired(), 1);
}

#[test]
fn test_paging_within_window() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .skip(1)
        .limit(3)
        .set_hint(AUTOMATIC_PAGE_SIZE, 2)
        .unwrap();
    assert_eq!(names(&stream.to_list().unwrap()), vec!["Bob", "Carol", "Dave"]);

    let windows: Vec<Window> = executor.fetches().iter().map(|f| f.window).collect();
    assert_eq!(
        windows,
        vec![
            Window { skip: 1, limit: Some(2) },
            Window { skip: 3, limit: Some(1) },
        ]
    );
}

#[test]
fn test_iteration_is_lazy() {
    let executor = executor();
    let stream = provider()
        .stream_all(&executor, "Customer")
        .set_hint(AUTOMATIC_PAGE_SIZE, 2)
        .unwrap();

    let mut iter = stream.iter().unwrap();
    assert_eq!(executor.fetches().len(), 0);

    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.attribute("name"), Some(&Value::from("Alice")));
    assert_eq!(executor.fetches().len(), 1);

    // Dropping the iterator early gives the handle back.
    assert_eq!(executor.open_handles(), 1);
    drop(iter);
    assert_eq!(executor.open_handles(), 0);
    assert_eq!(executor.fetches().len(), 1);
}

#[test]
fn test_window_is_passed_to_executor() {
    let executor = executor();
    let stream = provider().stream_all(&executor, "Customer").skip(3).limit(10);
    assert_eq!(stream.query_text().unwrap(), "SELECT A FROM Customer A");
    assert_eq!(names(&stream.to_list().unwrap()), vec!["Dave", "Eve"]);
    assert_eq!(
        executor.fetches()[0].window,
        Window { skip: 3, limit: Some(10) }
    );
}

#[test]
fn test_invalid_page_size_rejected() {
    let executor = executor();
    let stream = provider().stream_all(&executor, "Customer");
    assert!(matches!(
        stream.set_hint(AUTOMATIC_PAGE_SIZE, 0),
        Err(QueryError::InvalidHint { .. })
    ));
    assert!(matches!(
        stream.set_hint(AUTOMATIC_PAGE_SIZE, "many"),
        Err(QueryError::InvalidHint { .. })
    ));
}
