//! CSV source connector

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use csv::ReaderBuilder;
use sacbeh_core::{MemoryHandle, NullConfig, Operation, Result, SourceConnector, SourceHandle};

use super::{run_blocking, BatchWriter};
use crate::schema::SchemaDetector;
use crate::DataError;

/// Rows inspected for type detection
const MAX_SAMPLE_ROWS: usize = 5000;

/// Connector for a CSV file with a header row.
///
/// Column types are inferred from a sample of rows. Opening a handle reads
/// the whole file into memory.
pub struct CsvConnector {
    path: PathBuf,
    name: String,
    null_config: NullConfig,
    sample_rows: usize,
}

impl CsvConnector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();
        Self {
            path,
            name,
            null_config: NullConfig::default(),
            sample_rows: MAX_SAMPLE_ROWS,
        }
    }

    pub fn with_null_config(mut self, null_config: NullConfig) -> Self {
        self.null_config = null_config;
        self
    }

    pub fn with_sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows.max(1);
        self
    }

    fn reader(path: &Path) -> std::result::Result<csv::Reader<BufReader<File>>, DataError> {
        let file = File::open(path)?;
        Ok(ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file)))
    }

    /// Read the header and sample rows, then detect column types
    fn analyze_file(path: &Path, detector: &SchemaDetector) -> std::result::Result<SchemaRef, DataError> {
        let mut reader = Self::reader(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(DataError::SchemaDetection("file has no header row".to_string()));
        }

        let mut samples = Vec::new();
        for record in reader.records().take(detector.sample_size()) {
            samples.push(record?.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let info = detector.detect_from_samples(&headers, &samples);
        for header in &headers {
            let Some(stats) = info.column_stats.get(header) else { continue };
            if !samples.is_empty() && stats.null_count == samples.len() {
                tracing::warn!("Column '{}' has no values in the first {} rows", header, samples.len());
            } else {
                tracing::debug!(
                    "Column '{}': {} nulls, {} distinct values in sample",
                    header,
                    stats.null_count,
                    stats.distinct_count
                );
            }
        }
        Ok(Arc::new(info.schema))
    }

    fn read_file(
        path: &Path,
        schema: SchemaRef,
        null_config: &NullConfig,
    ) -> std::result::Result<Vec<arrow::record_batch::RecordBatch>, DataError> {
        let mut reader = Self::reader(path)?;
        let width = schema.fields().len();
        let mut writer = BatchWriter::new(schema);

        for record in reader.records() {
            let record = record?;
            for col_idx in 0..width {
                let builder = writer.column(col_idx);
                match record.get(col_idx) {
                    Some(value) if !null_config.is_null(value) => builder.append_text(value.trim()),
                    _ => builder.append_null(),
                }
            }
            writer.end_row()?;
        }
        writer.finish()
    }

    fn detector(&self) -> SchemaDetector {
        SchemaDetector::new()
            .with_sample_size(self.sample_rows)
            .with_null_config(self.null_config.clone())
    }
}

#[async_trait]
impl SourceConnector for CsvConnector {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "csv"
    }

    async fn introspect_schema(&self) -> Result<SchemaRef> {
        let path = self.path.clone();
        let detector = self.detector();
        run_blocking(move || Self::analyze_file(&path, &detector))
            .await
            .map_err(|e| e.into_engine(Operation::Introspect, &self.name))
    }

    async fn open(&self) -> Result<Arc<dyn SourceHandle>> {
        let path = self.path.clone();
        let detector = self.detector();
        let null_config = self.null_config.clone();
        let (schema, batches) = run_blocking(move || {
            let schema = Self::analyze_file(&path, &detector)?;
            let batches = Self::read_file(&path, schema.clone(), &null_config)?;
            Ok((schema, batches))
        })
        .await
        .map_err(|e| e.into_engine(Operation::Open, &self.name))?;

        let handle = MemoryHandle::new(self.name.clone(), schema, batches);
        tracing::info!("Loaded {} rows from '{}'", handle.row_count(), self.name);
        Ok(Arc::new(handle))
    }

    async fn row_count_estimate(&self) -> Result<usize> {
        let path = self.path.clone();
        run_blocking(move || Ok(Self::reader(&path)?.records().count()))
            .await
            .map_err(|e| e.into_engine(Operation::Introspect, &self.name))
    }
}
