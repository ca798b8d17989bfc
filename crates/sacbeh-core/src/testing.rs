//! Fixtures shared by the crate's tests

use std::sync::Arc;

use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::backend::{AggregateRequest, AggregationBackend};
use crate::connector::{MemoryConnector, SourceConnector, SourceHandle};
use crate::error::{EngineError, Operation, Result};
use crate::result::AggregationResult;

/// West: Desk 200, Chair 150, Lamp 30 (Q1 300, Q2 50, Q3 30)
/// East: Desk 120, Chair 80, Lamp 60
pub fn sales_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("region", DataType::Utf8, false),
        Field::new("product", DataType::Utf8, false),
        Field::new("quarter", DataType::Utf8, false),
        Field::new("sales", DataType::Float64, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["West", "West", "West", "West", "East", "East", "East"])),
            Arc::new(StringArray::from(vec!["Chair", "Chair", "Desk", "Lamp", "Chair", "Desk", "Lamp"])),
            Arc::new(StringArray::from(vec!["Q1", "Q2", "Q1", "Q3", "Q1", "Q2", "Q2"])),
            Arc::new(Float64Array::from(vec![100.0, 50.0, 200.0, 30.0, 80.0, 120.0, 60.0])),
        ],
    )
    .expect("fixture batch")
}

pub fn sales_connector() -> Arc<dyn SourceConnector> {
    Arc::new(MemoryConnector::from_batches("sales", vec![sales_batch()]).expect("fixture connector"))
}

/// Connector whose source cannot be reached
pub struct UnreachableConnector;

#[async_trait]
impl SourceConnector for UnreachableConnector {
    fn source_name(&self) -> &str {
        "unreachable"
    }

    fn kind(&self) -> &str {
        "test"
    }

    async fn introspect_schema(&self) -> Result<SchemaRef> {
        Err(EngineError::Connection {
            operation: Operation::Introspect,
            source_name: "unreachable".to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn open(&self) -> Result<Arc<dyn SourceHandle>> {
        Err(EngineError::Connection {
            operation: Operation::Open,
            source_name: "unreachable".to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn row_count_estimate(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Backend that fails every request
pub struct BrokenBackend;

#[async_trait]
impl AggregationBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    async fn aggregate(
        &self,
        _handle: Arc<dyn SourceHandle>,
        request: &AggregateRequest,
    ) -> Result<AggregationResult> {
        Err(request.failure("broken", "disk on fire"))
    }
}
