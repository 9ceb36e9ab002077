//! A scripted in-memory executor.
//!
//! Responses are registered per query text; every fetch slices the scripted
//! rows by the request window, so paging and skip/limit behave as they would
//! against a real engine. Counters record acquisitions, releases and fetches.
//!
//! ```ignore
//! let executor = MemoryExecutor::new().with_syntax_check();
//! executor.respond("SELECT A.country FROM Customer A", vec![
//!     vec![Value::from("UK")],
//!     vec![Value::from("Canada")],
//! ]);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use super::{ExecutionHandle, ExecutorError, ExecutorResult, FetchRequest, QueryExecutor, Row};
use crate::sql::query::Window;
use crate::sql::validate::check_syntax;
use crate::value::Value;

/// A fetch as the executor saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub handle: u64,
    pub query: String,
    pub params: BTreeMap<String, Value>,
    pub window: Window,
}

/// In-memory [`QueryExecutor`] with scripted results.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    /// Rows per query text.
    responses: DashMap<String, Vec<Row>>,
    /// Errors per query text, checked before responses.
    failures: DashMap<String, ExecutorError>,
    /// Handles acquired and not yet released.
    open: DashMap<u64, ()>,
    next_handle: AtomicU64,
    acquired: AtomicUsize,
    released: AtomicUsize,
    /// Every fetch, in order.
    log: Mutex<Vec<FetchRecord>>,
    /// Parse query text before answering.
    syntax_check: bool,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject query text that does not parse.
    pub fn with_syntax_check(mut self) -> Self {
        self.syntax_check = true;
        self
    }

    /// Script the rows returned for `query`.
    pub fn respond(&self, query: impl Into<String>, rows: Vec<Row>) {
        self.responses.insert(query.into(), rows);
    }

    /// Script a single-column result.
    pub fn respond_values(&self, query: impl Into<String>, values: Vec<Value>) {
        self.respond(query, values.into_iter().map(|v| vec![v]).collect());
    }

    /// Make `query` fail with `error`.
    pub fn fail(&self, query: impl Into<String>, error: ExecutorError) {
        self.failures.insert(query.into(), error);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Handles currently held by callers.
    pub fn open_handles(&self) -> usize {
        self.open.len()
    }

    /// All fetches so far.
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Distinct query texts fetched so far, in first-seen order.
    pub fn queries(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for record in self.fetches() {
            if !seen.contains(&record.query) {
                seen.push(record.query);
            }
        }
        seen
    }
}

fn slice(rows: &[Row], window: Window) -> Vec<Row> {
    let skip = usize::try_from(window.skip).unwrap_or(usize::MAX);
    let take = window
        .limit
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    rows.iter().skip(skip).take(take).cloned().collect()
}

impl QueryExecutor for MemoryExecutor {
    fn acquire(&self) -> ExecutorResult<ExecutionHandle> {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.insert(id, ());
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionHandle::new(id))
    }

    fn fetch(&self, handle: &ExecutionHandle, request: FetchRequest<'_>) -> ExecutorResult<Vec<Row>> {
        if !self.open.contains_key(&handle.id()) {
            return Err(ExecutorError::UnknownHandle(handle.id()));
        }

        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(FetchRecord {
                handle: handle.id(),
                query: request.query.to_string(),
                params: request.params.clone(),
                window: request.window,
            });

        if self.syntax_check {
            check_syntax(request.query)?;
        }
        if let Some(error) = self.failures.get(request.query) {
            return Err(error.value().clone());
        }
        let rows = self
            .responses
            .get(request.query)
            .ok_or_else(|| ExecutorError::NoResponse(request.query.to_string()))?;
        Ok(slice(rows.value(), request.window))
    }

    fn release(&self, handle: ExecutionHandle) {
        if self.open.remove(&handle.id()).is_some() {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
