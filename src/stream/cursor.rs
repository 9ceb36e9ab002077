//! Forward-only result cursor.
//!
//! Without a page size the cursor issues one fetch for the whole window. With
//! `automaticPageSize` it fetches successive pages as the consumer advances and
//! stops after the first short page. The execution handle is held by a
//! [`HandleGuard`], so it is released when the cursor is exhausted, fails, or
//! is dropped early.

use std::collections::VecDeque;
use std::num::NonZeroU64;

use uuid::Uuid;

use crate::compile::CompiledQuery;
use crate::error::{QueryError, QueryResult};
use crate::executor::{ExecutionHandle, ExecutorResult, FetchRequest, QueryExecutor};
use crate::sql::expr::TupleShape;
use crate::value::{Row, Value};

/// Releases an execution handle exactly once.
pub(crate) struct HandleGuard<'e> {
    executor: &'e dyn QueryExecutor,
    handle: Option<ExecutionHandle>,
}

impl<'e> HandleGuard<'e> {
    pub(crate) fn acquire(executor: &'e dyn QueryExecutor) -> ExecutorResult<Self> {
        let handle = executor.acquire()?;
        Ok(Self {
            executor,
            handle: Some(handle),
        })
    }

    pub(crate) fn fetch(&self, request: FetchRequest<'_>) -> ExecutorResult<Vec<Row>> {
        match &self.handle {
            Some(handle) => self.executor.fetch(handle, request),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.executor.release(handle);
        }
    }
}

/// Run a compiled query once and return all rows in its window.
pub(crate) fn fetch_all(executor: &dyn QueryExecutor, query: &CompiledQuery) -> QueryResult<Vec<Row>> {
    let guard = HandleGuard::acquire(executor)?;
    let rows = guard.fetch(FetchRequest {
        query: &query.text,
        params: &query.params,
        window: query.window,
    })?;
    Ok(rows)
}

/// Rows of one compiled query, fetched on demand.
pub struct Cursor<'e> {
    id: Uuid,
    guard: Option<HandleGuard<'e>>,
    query: CompiledQuery,
    page_size: Option<NonZeroU64>,
    /// Rows consumed from the query window so far.
    offset: u64,
    buffer: VecDeque<Row>,
    fetches: usize,
}

impl<'e> Cursor<'e> {
    /// Acquire a handle for `query`. Nothing is fetched yet.
    pub(crate) fn open(
        executor: &'e dyn QueryExecutor,
        query: CompiledQuery,
        page_size: Option<NonZeroU64>,
    ) -> QueryResult<Self> {
        let guard = HandleGuard::acquire(executor)?;
        let id = Uuid::new_v4();
        tracing::trace!(cursor = %id, text = %query.text, "cursor opened");
        Ok(Self {
            id,
            guard: Some(guard),
            query,
            page_size,
            offset: 0,
            buffer: VecDeque::new(),
            fetches: 0,
        })
    }

    /// Fetches issued so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Whether the execution handle has been given back.
    pub fn is_closed(&self) -> bool {
        self.guard.is_none()
    }

    fn close(&mut self) {
        if self.guard.take().is_some() {
            tracing::trace!(cursor = %self.id, fetches = self.fetches, "cursor closed");
        }
    }

    /// Fetch the next page into the buffer. Closes the cursor on the last page.
    fn fill(&mut self) -> QueryResult<()> {
        let Some(guard) = &self.guard else {
            return Ok(());
        };

        let base = self.query.window;
        if base.limit.is_some_and(|limit| self.offset >= limit) {
            self.close();
            return Ok(());
        }
        let window = match self.page_size {
            Some(size) => base.page(self.offset, size.get()),
            None => base,
        };

        let rows = guard.fetch(FetchRequest {
            query: &self.query.text,
            params: &self.query.params,
            window,
        })?;
        self.fetches += 1;
        tracing::trace!(
            cursor = %self.id,
            skip = window.skip,
            limit = ?window.limit,
            rows = rows.len(),
            "fetched page"
        );

        let fetched = rows.len() as u64;
        self.offset += fetched;
        self.buffer.extend(rows);

        let last = match self.page_size {
            Some(size) => fetched < size.get(),
            None => true,
        };
        if last {
            self.close();
        }
        Ok(())
    }
}

impl Iterator for Cursor<'_> {
    type Item = QueryResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Some(Ok(row));
            }
            if self.guard.is_none() {
                return None;
            }
            if let Err(e) = self.fill() {
                self.close();
                return Some(Err(e));
            }
        }
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Rebuild a stream element from a flat row using the projection shape.
pub(crate) fn assemble(row: Row, shape: &TupleShape) -> QueryResult<Value> {
    let expected = shape.width();
    if row.len() != expected {
        return Err(QueryError::RowShape {
            expected,
            found: row.len(),
        });
    }
    let mut values = row.into_iter();
    Ok(build(&mut values, shape))
}

fn build(values: &mut impl Iterator<Item = Value>, shape: &TupleShape) -> Value {
    match shape {
        TupleShape::Leaf => values.next().unwrap_or(Value::Null),
        TupleShape::Group(parts) => Value::Tuple(parts.iter().map(|p| build(values, p)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::executor::MemoryExecutor;
    use crate::sql::{Dialect, QueryModel};

    const ALL: &str = "SELECT A FROM Customer A";

    fn executor(n: i64) -> MemoryExecutor {
        let executor = MemoryExecutor::new();
        executor.respond_values(ALL, (0..n).map(Value::Int).collect());
        executor
    }

    fn query(model: &QueryModel) -> CompiledQuery {
        compile(model, Dialect::Jpql).unwrap()
    }

    #[test]
    fn test_single_fetch_without_page_size() {
        let executor = executor(5);
        let mut cursor = Cursor::open(&executor, query(&QueryModel::root("Customer")), None).unwrap();
        let rows: Vec<Row> = cursor.by_ref().collect::<QueryResult<_>>().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(cursor.fetches(), 1);
        assert!(cursor.is_closed());
        assert_eq!(executor.released(), 1);
    }

    #[test]
    fn test_paging() {
        let executor = executor(5);
        let mut cursor = Cursor::open(
            &executor,
            query(&QueryModel::root("Customer")),
            NonZeroU64::new(2),
        )
        .unwrap();
        let rows: Vec<Row> = cursor.by_ref().collect::<QueryResult<_>>().unwrap();
        assert_eq!(rows.len(), 5);
        // 2 + 2 + 1
        assert_eq!(cursor.fetches(), 3);

        let windows: Vec<_> = executor.fetches().iter().map(|f| f.window).collect();
        assert_eq!(windows[1].skip, 2);
        assert_eq!(windows[1].limit, Some(2));
    }

    #[test]
    fn test_exact_multiple_needs_one_more_fetch() {
        let executor = executor(4);
        let mut cursor = Cursor::open(
            &executor,
            query(&QueryModel::root("Customer")),
            NonZeroU64::new(2),
        )
        .unwrap();
        assert_eq!(cursor.by_ref().count(), 4);
        assert_eq!(cursor.fetches(), 3);
    }

    #[test]
    fn test_paging_respects_limit() {
        let executor = executor(10);
        let model = QueryModel::root("Customer").skip(1).limit(4);
        let mut cursor = Cursor::open(&executor, query(&model), NonZeroU64::new(2)).unwrap();
        let rows: Vec<Row> = cursor.by_ref().collect::<QueryResult<_>>().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1)],
                vec![Value::Int(2)],
                vec![Value::Int(3)],
                vec![Value::Int(4)]
            ]
        );
        assert_eq!(cursor.fetches(), 2);
    }

    #[test]
    fn test_early_drop_releases() {
        let executor = executor(10);
        let mut cursor = Cursor::open(
            &executor,
            query(&QueryModel::root("Customer")),
            NonZeroU64::new(3),
        )
        .unwrap();
        assert!(cursor.next().is_some());
        assert_eq!(executor.open_handles(), 1);
        drop(cursor);
        assert_eq!(executor.open_handles(), 0);
        assert_eq!(executor.released(), 1);
    }

    #[test]
    fn test_error_closes_cursor() {
        let executor = MemoryExecutor::new();
        let mut cursor = Cursor::open(&executor, query(&QueryModel::root("Customer")), None).unwrap();
        assert!(matches!(cursor.next(), Some(Err(QueryError::Executor(_)))));
        assert!(cursor.next().is_none());
        assert_eq!(executor.released(), 1);
    }

    #[test]
    fn test_assemble_nested() {
        let shape = TupleShape::Group(vec![
            TupleShape::Group(vec![TupleShape::Leaf, TupleShape::Leaf]),
            TupleShape::Leaf,
        ]);
        let row = vec![Value::from("Alice"), Value::from("UK"), Value::Int(10)];
        assert_eq!(
            assemble(row, &shape).unwrap(),
            Value::pair(Value::pair("Alice", "UK"), 10i64)
        );
        assert_eq!(
            assemble(vec![Value::Int(1)], &shape).unwrap_err(),
            QueryError::RowShape {
                expected: 3,
                found: 1
            }
        );
    }
}
