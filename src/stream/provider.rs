//! Entry point for opening query streams.

use std::sync::Arc;

use crate::config::{Settings, SettingsError};
use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::metamodel::Metamodel;
use crate::sql::query::{Hints, QueryModel};
use crate::sql::Dialect;

use super::QueryStream;

/// Opens streams over the entity types of a metamodel.
///
/// # Example
///
/// ```ignore
/// let provider = StreamProvider::new(metamodel).with_dialect(Dialect::Hql);
/// let names = provider
///     .stream_all(&executor, "Customer")
///     .select(Lambda::new(|c: Sym| c.get("name")))
///     .to_list()?;
/// ```
#[derive(Debug, Clone)]
pub struct StreamProvider {
    metamodel: Arc<Metamodel>,
    dialect: Dialect,
    hints: Hints,
}

impl StreamProvider {
    pub fn new(metamodel: Metamodel) -> Self {
        Self {
            metamodel: Arc::new(metamodel),
            dialect: Dialect::default(),
            hints: Hints::default(),
        }
    }

    /// Build a provider from loaded settings: the configured metamodel,
    /// dialect and default hints.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self {
            metamodel: Arc::new(settings.metamodel()?),
            dialect: settings.translation.dialect,
            hints: settings.hints()?,
        })
    }

    /// Set the query dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Hints every new stream starts with.
    pub fn with_hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }

    pub fn metamodel(&self) -> &Metamodel {
        &self.metamodel
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn hints(&self) -> Hints {
        self.hints
    }

    /// A stream over all instances of `entity`.
    ///
    /// An unknown entity type is reported by the first terminal operation.
    pub fn stream_all<'e>(&self, executor: &'e dyn QueryExecutor, entity: &str) -> QueryStream<'e> {
        let model = QueryModel::root(entity).with_hints(self.hints);
        let stream = QueryStream::new(executor, Arc::clone(&self.metamodel), self.dialect, model);
        if self.metamodel.contains(entity) {
            stream
        } else {
            stream.failed(QueryError::UnknownEntity(entity.to_string()))
        }
    }
}
