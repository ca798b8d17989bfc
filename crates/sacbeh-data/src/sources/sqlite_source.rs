//! SQLite source connector

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use sacbeh_core::schema::{SEMANTIC_METADATA_KEY, SEMANTIC_TEMPORAL};
use sacbeh_core::{EngineError, Operation, RelationalAccess, Result, SourceConnector, SourceHandle, SqlValue};

use super::{run_blocking, BatchWriter};
use crate::DataError;

/// Connector for one table of a SQLite database
pub struct SqliteConnector {
    path: PathBuf,
    table: String,
    name: String,
}

impl SqliteConnector {
    pub fn new(path: impl AsRef<Path>, table: impl Into<String>) -> Self {
        let path = path.as_ref().to_path_buf();
        let table = table.into();
        let file = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.db");
        let name = format!("{}:{}", file, table);
        Self { path, table, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn connect(path: &Path) -> std::result::Result<Connection, DataError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Connection::open_with_flags(path, flags)?)
    }

    /// Detect schema from the table's declared column types
    fn detect_schema(conn: &Connection, table: &str) -> std::result::Result<Schema, DataError> {
        let query = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = conn.prepare(&query)?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,  // column name
                row.get::<_, String>(2)?,  // declared type
                row.get::<_, i32>(3)? == 0, // nullable
            ))
        })?;

        let mut fields = Vec::new();
        for row in rows {
            let (name, declared, nullable) = row?;
            let (data_type, temporal) = column_type(&declared);
            let mut field = Field::new(&name, data_type, nullable);
            if temporal {
                field = field.with_metadata(HashMap::from([(
                    SEMANTIC_METADATA_KEY.to_string(),
                    SEMANTIC_TEMPORAL.to_string(),
                )]));
            }
            fields.push(field);
        }

        if fields.is_empty() {
            return Err(DataError::SchemaDetection(format!(
                "table '{}' does not exist or has no columns",
                table
            )));
        }

        Ok(Schema::new(fields))
    }

    fn count_rows(conn: &Connection, table: &str) -> std::result::Result<usize, DataError> {
        let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = conn.query_row(&query, [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl SourceConnector for SqliteConnector {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "sqlite"
    }

    async fn introspect_schema(&self) -> Result<SchemaRef> {
        let path = self.path.clone();
        let table = self.table.clone();
        let schema = run_blocking(move || {
            let conn = Self::connect(&path)?;
            Self::detect_schema(&conn, &table)
        })
        .await
        .map_err(|e| e.into_engine(Operation::Introspect, &self.name))?;

        tracing::debug!("Introspected {} columns of '{}'", schema.fields().len(), self.name);
        Ok(Arc::new(schema))
    }

    async fn open(&self) -> Result<Arc<dyn SourceHandle>> {
        let path = self.path.clone();
        let table = self.table.clone();
        let (conn, schema) = run_blocking(move || {
            let conn = Self::connect(&path)?;
            let schema = Self::detect_schema(&conn, &table)?;
            Ok((conn, schema))
        })
        .await
        .map_err(|e| e.into_engine(Operation::Open, &self.name))?;

        tracing::info!("Opened SQLite source '{}' (read-only)", self.name);
        Ok(Arc::new(SqliteHandle {
            name: self.name.clone(),
            table: self.table.clone(),
            schema: Arc::new(schema),
            conn: Mutex::new(Some(conn)),
        }))
    }

    async fn row_count_estimate(&self) -> Result<usize> {
        let path = self.path.clone();
        let table = self.table.clone();
        run_blocking(move || {
            let conn = Self::connect(&path)?;
            Self::count_rows(&conn, &table)
        })
        .await
        .map_err(|e| e.into_engine(Operation::Introspect, &self.name))
    }
}

/// Open read-only connection to one table
pub struct SqliteHandle {
    name: String,
    table: String,
    schema: SchemaRef,
    conn: Mutex<Option<Connection>>,
}

impl SqliteHandle {
    fn closed(&self, operation: Operation) -> EngineError {
        EngineError::Connection {
            operation,
            source_name: self.name.clone(),
            message: "handle is closed".to_string(),
        }
    }

    fn read_table(&self, conn: &Connection) -> std::result::Result<Vec<RecordBatch>, DataError> {
        let columns: Vec<String> = self.schema.fields().iter().map(|f| quote_ident(f.name())).collect();
        let query = format!("SELECT {} FROM {}", columns.join(", "), quote_ident(&self.table));
        let mut stmt = conn.prepare(&query)?;
        let mut rows = stmt.query([])?;

        let mut writer = BatchWriter::new(self.schema.clone());
        while let Some(row) = rows.next()? {
            for col_idx in 0..columns.len() {
                let builder = writer.column(col_idx);
                match row.get_ref(col_idx)? {
                    ValueRef::Integer(i) => builder.append_int(i),
                    ValueRef::Real(f) => builder.append_real(f),
                    ValueRef::Text(s) => builder.append_text(&String::from_utf8_lossy(s)),
                    ValueRef::Null | ValueRef::Blob(_) => builder.append_null(),
                }
            }
            writer.end_row()?;
        }
        writer.finish()
    }
}

impl SourceHandle for SqliteHandle {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn scan(&self) -> Result<Vec<RecordBatch>> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(|| self.closed(Operation::Aggregate))?;
        let batches = self
            .read_table(conn)
            .map_err(|e| e.into_engine(Operation::Aggregate, &self.name))?;
        tracing::debug!(
            "Scanned {} rows from '{}'",
            batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            self.name
        );
        Ok(batches)
    }

    fn relational(&self) -> Option<&dyn RelationalAccess> {
        Some(self)
    }

    fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close()
                .map_err(|(_, e)| DataError::from(e).into_engine(Operation::Close, &self.name))?;
            tracing::debug!("Closed SQLite handle '{}'", self.name);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

impl RelationalAccess for SqliteHandle {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn query_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(|| self.closed(Operation::Aggregate))?;

        let run = || -> std::result::Result<Vec<Vec<SqlValue>>, DataError> {
            let mut stmt = conn.prepare(sql)?;
            let width = stmt.column_count();
            let mut rows = stmt.query(params_from_iter(params.iter().map(to_sqlite)))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(from_sqlite(row.get_ref(idx)?));
                }
                out.push(values);
            }
            Ok(out)
        };

        tracing::trace!("{} -- {:?}", sql, params);
        run().map_err(|e| e.into_engine(Operation::Aggregate, &self.name))
    }
}

/// Map a declared SQLite column type to an arrow type, and whether it holds dates
fn column_type(declared: &str) -> (DataType, bool) {
    let declared = declared.to_uppercase();
    if declared.contains("BOOL") {
        (DataType::Boolean, false)
    } else if declared.contains("DATE") || declared.contains("TIME") {
        (DataType::Utf8, true)
    } else if declared.contains("INT") {
        (DataType::Int64, false)
    } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
        .iter()
        .any(|t| declared.contains(t))
    {
        (DataType::Float64, false)
    } else {
        (DataType::Utf8, false)
    }
}

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(s) => SqlValue::Text(String::from_utf8_lossy(s).into_owned()),
    }
}
