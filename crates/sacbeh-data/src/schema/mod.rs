//! Column type detection for text sources

use std::collections::HashMap;

use arrow::datatypes::{DataType, Field, Schema};
use chrono::{NaiveDate, NaiveDateTime};
use sacbeh_core::schema::{SEMANTIC_METADATA_KEY, SEMANTIC_TEMPORAL};
use sacbeh_core::NullConfig;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Schema detector for analyzing sampled rows and determining column types
pub struct SchemaDetector {
    sample_size: usize,
    null_config: NullConfig,
}

/// Statistics about a column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnStats {
    pub null_count: usize,
    pub distinct_count: usize,
}

/// Information about a detected schema
#[derive(Debug, Clone)]
pub struct SchemaInfo {
    pub schema: Schema,
    pub column_stats: HashMap<String, ColumnStats>,
}

impl SchemaDetector {
    pub fn new() -> Self {
        Self {
            sample_size: 1000,
            null_config: NullConfig::default(),
        }
    }

    /// Set the sample size for detection
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    pub fn with_null_config(mut self, null_config: NullConfig) -> Self {
        self.null_config = null_config;
        self
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Detect schema from sample data.
    ///
    /// Columns whose non-null values all parse as dates or datetimes stay text
    /// and are tagged temporal through field metadata, so group keys keep the
    /// source's own formatting.
    pub fn detect_from_samples(&self, headers: &[String], samples: &[Vec<String>]) -> SchemaInfo {
        let mut fields = Vec::with_capacity(headers.len());
        let mut column_stats = HashMap::new();

        for (col_idx, header) in headers.iter().enumerate() {
            let (kind, stats) = self.analyze_column(samples.iter().take(self.sample_size), col_idx);
            let mut field = Field::new(header, kind.data_type(), true);
            if kind == ColumnKind::Temporal {
                field = field.with_metadata(HashMap::from([(
                    SEMANTIC_METADATA_KEY.to_string(),
                    SEMANTIC_TEMPORAL.to_string(),
                )]));
            }
            fields.push(field);
            column_stats.insert(header.clone(), stats);
        }

        SchemaInfo {
            schema: Schema::new(fields),
            column_stats,
        }
    }

    fn analyze_column<'a>(
        &self,
        samples: impl Iterator<Item = &'a Vec<String>>,
        col_idx: usize,
    ) -> (ColumnKind, ColumnStats) {
        let mut null_count = 0;
        let mut distinct = std::collections::HashSet::new();
        let mut is_int = true;
        let mut is_float = true;
        let mut is_temporal = true;
        let mut is_bool = true;

        for row in samples {
            let value = match row.get(col_idx) {
                Some(value) if !self.null_config.is_null(value) => value.trim(),
                _ => {
                    null_count += 1;
                    continue;
                }
            };
            distinct.insert(value.to_string());

            if is_int && value.parse::<i64>().is_err() {
                is_int = false;
            }
            if is_float && value.parse::<f64>().is_err() {
                is_float = false;
            }
            if is_temporal && !looks_like_date(value) {
                is_temporal = false;
            }
            if is_bool && !matches!(value.to_lowercase().as_str(), "true" | "false") {
                is_bool = false;
            }
        }

        let kind = if distinct.is_empty() {
            ColumnKind::Text
        } else if is_bool {
            ColumnKind::Boolean
        } else if is_int {
            ColumnKind::Integer
        } else if is_float {
            ColumnKind::Float
        } else if is_temporal {
            ColumnKind::Temporal
        } else {
            ColumnKind::Text
        };

        let stats = ColumnStats {
            null_count,
            distinct_count: distinct.len(),
        };
        (kind, stats)
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Temporal,
    Text,
}

impl ColumnKind {
    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Temporal | ColumnKind::Text => DataType::Utf8,
        }
    }
}

/// Whether `value` parses as a calendar date or datetime
pub fn looks_like_date(value: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|format| NaiveDate::parse_from_str(value, format).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_detects_column_types() {
        let headers: Vec<String> = ["region", "units", "sales", "order_date", "promo"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let samples = rows(&[
            &["West", "3", "10.5", "2024-01-02", "true"],
            &["East", "N/A", "7", "2024-02-11", "FALSE"],
            &["", "5", "", "2024-03-05", "true"],
        ]);

        let info = SchemaDetector::new().detect_from_samples(&headers, &samples);
        let types: Vec<&DataType> = info.schema.fields().iter().map(|f| f.data_type()).collect();
        assert_eq!(
            types,
            vec![&DataType::Utf8, &DataType::Int64, &DataType::Float64, &DataType::Utf8, &DataType::Boolean]
        );

        let order_date = info.schema.field(3);
        assert_eq!(
            order_date.metadata().get(SEMANTIC_METADATA_KEY).map(String::as_str),
            Some(SEMANTIC_TEMPORAL)
        );
        assert!(info.schema.field(0).metadata().is_empty());

        assert_eq!(info.column_stats["region"].null_count, 1);
        assert_eq!(info.column_stats["units"].null_count, 1);
        assert_eq!(info.column_stats["region"].distinct_count, 2);
    }

    #[test]
    fn test_sample_size_limits_inspection() {
        let headers = vec!["code".to_string()];
        let samples = rows(&[&["1"], &["2"], &["x"]]);

        let info = SchemaDetector::new().with_sample_size(2).detect_from_samples(&headers, &samples);
        assert_eq!(info.schema.field(0).data_type(), &DataType::Int64);

        let info = SchemaDetector::new().detect_from_samples(&headers, &samples);
        assert_eq!(info.schema.field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_date_formats() {
        assert!(looks_like_date("2024-01-31"));
        assert!(looks_like_date("01/31/2024"));
        assert!(looks_like_date("2024-01-31 12:30:00"));
        assert!(!looks_like_date("2024-13-01"));
        assert!(!looks_like_date("Q1"));
    }
}
