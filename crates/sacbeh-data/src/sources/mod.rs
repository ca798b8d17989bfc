pub mod csv_source;
pub mod sqlite_source;

pub use csv_source::CsvConnector;
pub use sqlite_source::SqliteConnector;

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::DataError;

/// Rows per record batch when materializing a source
pub const BATCH_ROWS: usize = 8192;

/// Run blocking source I/O off the async runtime
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T, DataError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DataError> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await?
}

/// Typed arrow builder for one column
pub(crate) enum ColumnBuilder {
    Int(Int64Builder),
    Float(Float64Builder),
    Bool(BooleanBuilder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    pub(crate) fn for_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int64 => ColumnBuilder::Int(Int64Builder::new()),
            DataType::Float64 => ColumnBuilder::Float(Float64Builder::new()),
            DataType::Boolean => ColumnBuilder::Bool(BooleanBuilder::new()),
            _ => ColumnBuilder::Text(StringBuilder::new()),
        }
    }

    pub(crate) fn append_null(&mut self) {
        match self {
            ColumnBuilder::Int(b) => b.append_null(),
            ColumnBuilder::Float(b) => b.append_null(),
            ColumnBuilder::Bool(b) => b.append_null(),
            ColumnBuilder::Text(b) => b.append_null(),
        }
    }

    /// Append a text value, parsed for the column's type. Unparseable values become null.
    pub(crate) fn append_text(&mut self, value: &str) {
        match self {
            ColumnBuilder::Int(b) => b.append_option(value.parse::<i64>().ok()),
            ColumnBuilder::Float(b) => b.append_option(value.parse::<f64>().ok()),
            ColumnBuilder::Bool(b) => match value.to_lowercase().as_str() {
                "true" | "1" => b.append_value(true),
                "false" | "0" => b.append_value(false),
                _ => b.append_null(),
            },
            ColumnBuilder::Text(b) => b.append_value(value),
        }
    }

    pub(crate) fn append_int(&mut self, value: i64) {
        match self {
            ColumnBuilder::Int(b) => b.append_value(value),
            ColumnBuilder::Float(b) => b.append_value(value as f64),
            ColumnBuilder::Bool(b) => b.append_value(value != 0),
            ColumnBuilder::Text(b) => b.append_value(value.to_string()),
        }
    }

    pub(crate) fn append_real(&mut self, value: f64) {
        match self {
            ColumnBuilder::Int(b) => b.append_value(value as i64),
            ColumnBuilder::Float(b) => b.append_value(value),
            ColumnBuilder::Bool(b) => b.append_value(value != 0.0),
            ColumnBuilder::Text(b) => b.append_value(value.to_string()),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Int(b) => Arc::new(b.finish()),
            ColumnBuilder::Float(b) => Arc::new(b.finish()),
            ColumnBuilder::Bool(b) => Arc::new(b.finish()),
            ColumnBuilder::Text(b) => Arc::new(b.finish()),
        }
    }
}

/// Accumulates rows into record batches of [`BATCH_ROWS`]
pub(crate) struct BatchWriter {
    schema: SchemaRef,
    builders: Vec<ColumnBuilder>,
    rows: usize,
    batches: Vec<RecordBatch>,
}

impl BatchWriter {
    pub(crate) fn new(schema: SchemaRef) -> Self {
        let builders = schema
            .fields()
            .iter()
            .map(|field| ColumnBuilder::for_type(field.data_type()))
            .collect();
        Self {
            schema,
            builders,
            rows: 0,
            batches: Vec::new(),
        }
    }

    pub(crate) fn column(&mut self, idx: usize) -> &mut ColumnBuilder {
        &mut self.builders[idx]
    }

    /// Mark the current row complete
    pub(crate) fn end_row(&mut self) -> Result<(), DataError> {
        self.rows += 1;
        if self.rows == BATCH_ROWS {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DataError> {
        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        self.batches.push(RecordBatch::try_new(self.schema.clone(), arrays)?);
        self.rows = 0;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<Vec<RecordBatch>, DataError> {
        if self.rows > 0 {
            self.flush()?;
        }
        Ok(self.batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    #[test]
    fn test_writer_splits_batches() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
        ]));
        let mut writer = BatchWriter::new(schema);
        for i in 0..(BATCH_ROWS + 3) {
            writer.column(0).append_int(i as i64);
            writer.column(1).append_text("x");
            writer.end_row().unwrap();
        }
        let batches = writer.finish().unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].num_rows(), BATCH_ROWS);
        assert_eq!(batches[1].num_rows(), 3);
        let ids = batches[1].column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.value(0), BATCH_ROWS as i64);
    }

    #[test]
    fn test_unparseable_text_is_null() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("units", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
        ]));
        let mut writer = BatchWriter::new(schema);
        writer.column(0).append_text("seven");
        writer.column(1).append_null();
        writer.end_row().unwrap();
        let batches = writer.finish().unwrap();

        assert!(batches[0].column(0).is_null(0));
        let names = batches[0].column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert!(names.is_null(0));
    }
}
