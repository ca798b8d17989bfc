//! Source connector contract
//!
//! A connector introspects a data source and hands out scoped
//! [`SourceHandle`]s. Handles release their resources on [`SourceHandle::close`]
//! or when dropped.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{EngineError, Operation, Result};

/// Connector for one data source
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Human readable name of the source (file name, table, ...)
    fn source_name(&self) -> &str;

    /// Registry tag of the connector type
    fn kind(&self) -> &str;

    /// Field names and inferred types
    async fn introspect_schema(&self) -> Result<SchemaRef>;

    /// Acquire a handle on the source
    async fn open(&self) -> Result<Arc<dyn SourceHandle>>;

    /// Approximate number of rows, used to pick a row limit
    async fn row_count_estimate(&self) -> Result<usize>;
}

/// Open, scoped access to a data source.
///
/// Methods may block on I/O; async callers run them on a blocking thread.
pub trait SourceHandle: Send + Sync {
    fn source_name(&self) -> &str;

    fn schema(&self) -> SchemaRef;

    /// Raw row retrieval
    fn scan(&self) -> Result<Vec<RecordBatch>>;

    /// Relational capability for backends that push aggregation down
    fn relational(&self) -> Option<&dyn RelationalAccess> {
        None
    }

    /// Release the underlying resources. Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Value crossing the relational boundary
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Real(f) => Some(*f),
            SqlValue::Text(s) => s.parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) => Some(*f as i64),
            SqlValue::Text(s) => s.parse().ok(),
            SqlValue::Null => None,
        }
    }
}

/// A table reachable through SQL
pub trait RelationalAccess: Send + Sync {
    fn table_name(&self) -> &str;

    /// Run a read-only query with positional parameters
    fn query_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>>;
}

/// Handle over record batches held in memory
pub struct MemoryHandle {
    name: String,
    schema: SchemaRef,
    batches: RwLock<Option<Arc<Vec<RecordBatch>>>>,
}

impl MemoryHandle {
    pub fn new(name: impl Into<String>, schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            name: name.into(),
            schema,
            batches: RwLock::new(Some(Arc::new(batches))),
        }
    }

    pub fn row_count(&self) -> usize {
        self.batches
            .read()
            .as_ref()
            .map(|batches| batches.iter().map(RecordBatch::num_rows).sum())
            .unwrap_or(0)
    }
}

impl SourceHandle for MemoryHandle {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn scan(&self) -> Result<Vec<RecordBatch>> {
        let batches = self.batches.read();
        match batches.as_ref() {
            Some(batches) => Ok(batches.as_ref().clone()),
            None => Err(EngineError::Connection {
                operation: Operation::Aggregate,
                source_name: self.name.clone(),
                message: "handle is closed".to_string(),
            }),
        }
    }

    fn close(&self) -> Result<()> {
        if self.batches.write().take().is_some() {
            tracing::debug!("Released in-memory handle '{}'", self.name);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.batches.read().is_none()
    }
}

/// Connector over record batches supplied by the caller
pub struct MemoryConnector {
    name: String,
    schema: SchemaRef,
    batches: Arc<Vec<RecordBatch>>,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>, schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            name: name.into(),
            schema,
            batches: Arc::new(batches),
        }
    }

    /// Build from batches sharing one schema
    pub fn from_batches(name: impl Into<String>, batches: Vec<RecordBatch>) -> Result<Self> {
        let name = name.into();
        let schema = batches
            .first()
            .map(RecordBatch::schema)
            .ok_or_else(|| EngineError::SchemaIntrospection {
                operation: Operation::Introspect,
                source_name: name.clone(),
                message: "no record batches supplied".to_string(),
            })?;
        Ok(Self::new(name, schema, batches))
    }
}

#[async_trait]
impl SourceConnector for MemoryConnector {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "memory"
    }

    async fn introspect_schema(&self) -> Result<SchemaRef> {
        Ok(self.schema.clone())
    }

    async fn open(&self) -> Result<Arc<dyn SourceHandle>> {
        Ok(Arc::new(MemoryHandle::new(
            self.name.clone(),
            self.schema.clone(),
            self.batches.as_ref().clone(),
        )))
    }

    async fn row_count_estimate(&self) -> Result<usize> {
        Ok(self.batches.iter().map(RecordBatch::num_rows).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let column: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        RecordBatch::try_new(schema, vec![column]).unwrap()
    }

    #[tokio::test]
    async fn test_memory_connector_handle_lifecycle() {
        let connector = MemoryConnector::from_batches("numbers", vec![batch(), batch()]).unwrap();
        assert_eq!(connector.row_count_estimate().await.unwrap(), 6);

        let handle = connector.open().await.unwrap();
        assert_eq!(handle.scan().unwrap().len(), 2);
        assert!(handle.relational().is_none());

        handle.close().unwrap();
        handle.close().unwrap();
        assert!(handle.is_closed());
        assert!(matches!(handle.scan(), Err(EngineError::Connection { .. })));
    }

    #[test]
    fn test_empty_connector_is_rejected() {
        assert!(matches!(
            MemoryConnector::from_batches("empty", Vec::new()),
            Err(EngineError::SchemaIntrospection { .. })
        ));
    }
}
