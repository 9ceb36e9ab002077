//! # querystream
//!
//! Stream-style queries over entities, compiled to JPQL-like query text.
//!
//! ## Architecture
//!
//! Selectors and predicates are ordinary closures. They are run once over
//! symbolic handles, interpreted into query expressions, and merged into an
//! immutable query model that is only turned into text when a terminal
//! operation needs results:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            QueryStream chain (select, filter, join)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [lambda capture]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Trace (recorded ops)                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [symbolic interpretation]
//! ┌─────────────────────────────────────────────────────────┐
//! │           Expr / JoinRequest  ──merge──▶ QueryModel     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [emit + compile]
//! ┌─────────────────────────────────────────────────────────┐
//! │        CompiledQuery (text, parameters, window)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executor, cursor, client-side residual]
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Lazy stream of values                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use querystream::prelude::*;
//!
//! let provider = StreamProvider::new(metamodel);
//! let names = provider
//!     .stream_all(&executor, "Customer")
//!     .filter(Lambda::new(|c: Sym| c.get("debt").gt(250)))
//!     .select(Lambda::new(|c: Sym| c.get("name")))
//!     .to_list()?;
//! ```

pub mod compile;
pub mod config;
pub mod error;
pub mod executor;
pub mod interp;
pub mod lambda;
pub mod metamodel;
pub mod sql;
pub mod stream;
pub mod value;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{compile, CompiledQuery};
    pub use crate::config::Settings;
    pub use crate::error::{Clause, QueryError, QueryResult, TranslationError};
    pub use crate::executor::{
        ExecutionHandle, ExecutorError, FetchRequest, MemoryExecutor, QueryExecutor, Row,
    };
    pub use crate::lambda::{captured, EvalError, ExternalFn, Lambda, Sym};
    pub use crate::metamodel::{EntityType, Metamodel, ScalarType};
    pub use crate::sql::{
        Dialect, Hints, QueryModel, SortDir, Window, AUTOMATIC_PAGE_SIZE,
        EXCEPTION_ON_TRANSLATION_FAIL,
    };
    pub use crate::stream::{QueryIter, QueryStream, StreamProvider};
    pub use crate::value::{Entity, FromValue, Value};
}

// Also export at crate root for convenience
pub use compile::{compile, CompiledQuery};
pub use error::{QueryError, QueryResult};
pub use lambda::{Lambda, Sym};
pub use sql::Dialect;
pub use stream::{QueryStream, StreamProvider};
pub use value::Value;
