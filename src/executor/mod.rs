//! The query execution contract.
//!
//! The engine that runs query text is a collaborator: it accepts text plus
//! named parameters and returns ordered row tuples. Streams drive it through
//! [`QueryExecutor`]:
//!
//! ```text
//! acquire() ──▶ fetch(request) ... fetch(request) ──▶ release(handle)
//! ```
//!
//! `release` is called exactly once per handle, by a guard in the stream
//! cursor, also when an iterator is dropped early.

mod error;
mod memory;

use std::collections::BTreeMap;

pub use error::{ExecutorError, ExecutorResult};
pub use memory::{FetchRecord, MemoryExecutor};

use crate::sql::query::Window;
pub use crate::value::Row;
use crate::value::Value;

/// An acquired execution context (a cursor or connection on the engine side).
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ExecutionHandle {
    id: u64,
}

impl ExecutionHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A query to run with its parameters and the rows wanted.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub query: &'a str,
    pub params: &'a BTreeMap<String, Value>,
    pub window: Window,
}

/// Runs query text against a data engine.
///
/// # Example
///
/// ```ignore
/// use querystream::executor::{FetchRequest, QueryExecutor};
///
/// fn first_page(executor: &dyn QueryExecutor, request: FetchRequest<'_>) -> ExecutorResult<Vec<Row>> {
///     let handle = executor.acquire()?;
///     let rows = executor.fetch(&handle, request);
///     executor.release(handle);
///     rows
/// }
/// ```
pub trait QueryExecutor: Send + Sync {
    /// Acquire an execution handle.
    fn acquire(&self) -> ExecutorResult<ExecutionHandle>;

    /// Run a query and return the rows inside `request.window`.
    fn fetch(&self, handle: &ExecutionHandle, request: FetchRequest<'_>) -> ExecutorResult<Vec<Row>>;

    /// Give a handle back.
    fn release(&self, handle: ExecutionHandle);
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for std::sync::Arc<E> {
    fn acquire(&self) -> ExecutorResult<ExecutionHandle> {
        (**self).acquire()
    }

    fn fetch(&self, handle: &ExecutionHandle, request: FetchRequest<'_>) -> ExecutorResult<Vec<Row>> {
        (**self).fetch(handle, request)
    }

    fn release(&self, handle: ExecutionHandle) {
        (**self).release(handle)
    }
}
