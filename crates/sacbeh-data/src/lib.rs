//! Data sources and SQL pushdown for the path-traversal engine

pub mod backends;
pub mod schema;
pub mod sources;

use std::sync::Arc;

use arrow::error::ArrowError;
use sacbeh_core::{ComponentRegistry, EngineError, MemoryBackend, Operation};
use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use backends::SqlBackend;
pub use schema::SchemaDetector;
pub use sources::{CsvConnector, SqliteConnector};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema detection error: {0}")]
    SchemaDetection(String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}

impl DataError {
    /// Attach the failing operation and source
    pub fn into_engine(self, operation: Operation, source_name: &str) -> EngineError {
        let source_name = source_name.to_string();
        let message = self.to_string();
        match self {
            DataError::Io(_) | DataError::Sqlite(_) | DataError::Join(_) => EngineError::Connection {
                operation,
                source_name,
                message,
            },
            DataError::Arrow(_) | DataError::Csv(_) | DataError::SchemaDetection(_) => {
                EngineError::SchemaIntrospection {
                    operation,
                    source_name,
                    message,
                }
            }
        }
    }
}

/// Register the bundled connectors ("sqlite", "csv") and backends ("memory", "sql")
pub fn register_builtins(registry: &ComponentRegistry) {
    registry.register_connector("sqlite", |source| {
        let table = source.table.clone().ok_or_else(|| {
            EngineError::Config(format!("sqlite source {} needs a table", source.path.display()))
        })?;
        Ok(Arc::new(SqliteConnector::new(&source.path, table)))
    });
    registry.register_connector("csv", |source| {
        Ok(Arc::new(
            CsvConnector::new(&source.path).with_null_config(source.null_config.clone()),
        ))
    });
    registry.register_backend("memory", |_| Ok(Arc::new(MemoryBackend::new())));
    registry.register_backend("sql", |_| Ok(Arc::new(SqlBackend::new())));
}

/// Registry holding every bundled component
pub fn builtin_registry() -> Arc<ComponentRegistry> {
    let registry = ComponentRegistry::new();
    register_builtins(&registry);
    Arc::new(registry)
}

#[cfg(test)]
pub(crate) mod fixtures;
