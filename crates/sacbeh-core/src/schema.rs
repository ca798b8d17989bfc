//! Dimension and measure discovery over an arrow schema

use arrow::datatypes::{DataType, Field, SchemaRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field metadata key connectors use to tag text columns holding dates
pub const SEMANTIC_METADATA_KEY: &str = "sacbeh.semantic";

/// Metadata value marking a temporal column
pub const SEMANTIC_TEMPORAL: &str = "temporal";

/// Semantic type of a dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DimensionKind {
    /// Discrete values (text, booleans)
    Categorical,
    /// Dates and timestamps, grouped by their rendered value
    Temporal,
    /// Numeric field grouped into fixed-width bins
    NumericBinned { width: f64 },
}

/// A named field usable for grouping
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub field: String,
    pub kind: DimensionKind,
    pub label: String,
    pub data_type: DataType,
}

impl Dimension {
    /// Create a dimension with a label derived from the field name
    pub fn new(field: impl Into<String>, kind: DimensionKind, data_type: DataType) -> Self {
        let field = field.into();
        let label = display_label(&field);
        Self {
            field,
            kind,
            label,
            data_type,
        }
    }

    /// Bin width for numeric-binned dimensions
    pub fn bin_width(&self) -> Option<f64> {
        match self.kind {
            DimensionKind::NumericBinned { width } => Some(width),
            _ => None,
        }
    }

    /// Index of the bin holding `value`
    pub fn bin_index(width: f64, value: f64) -> i64 {
        (value / width).floor() as i64
    }

    /// Group key for a bin: its lower bound
    pub fn bin_label(width: f64, index: i64) -> String {
        format!("{}", index as f64 * width)
    }

    /// Bin index encoded by a group key produced by [`Dimension::bin_label`]
    pub fn parse_bin_label(width: f64, label: &str) -> Option<i64> {
        let lower: f64 = label.trim().parse().ok()?;
        Some((lower / width).round() as i64)
    }
}

/// "order_date" -> "Order Date"
fn display_label(field: &str) -> String {
    field
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_numeric(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _)
    )
}

fn is_temporal(field: &Field) -> bool {
    if field
        .metadata()
        .get(SEMANTIC_METADATA_KEY)
        .is_some_and(|v| v == SEMANTIC_TEMPORAL)
    {
        return true;
    }
    matches!(
        field.data_type(),
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _)
    )
}

fn is_categorical(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Boolean
    )
}

/// Schema of a loaded dataset with its discovered dimensions and measures
#[derive(Debug, Clone)]
pub struct DatasetSchema {
    source_name: String,
    dimensions: IndexMap<String, Dimension>,
    measures: IndexMap<String, DataType>,
}

impl DatasetSchema {
    /// Discover dimensions and measures from a connector's schema.
    ///
    /// Text and boolean columns become categorical dimensions, date-like columns
    /// temporal ones. Numeric columns are measures, and additionally binned
    /// dimensions when listed in `binned`.
    pub fn discover(
        source_name: impl Into<String>,
        arrow: SchemaRef,
        binned: &IndexMap<String, f64>,
    ) -> Self {
        let mut dimensions = IndexMap::new();
        let mut measures = IndexMap::new();

        for field in arrow.fields() {
            let name = field.name().clone();
            let data_type = field.data_type().clone();

            if is_temporal(field) {
                dimensions.insert(name.clone(), Dimension::new(&name, DimensionKind::Temporal, data_type));
            } else if is_categorical(&data_type) {
                dimensions.insert(name.clone(), Dimension::new(&name, DimensionKind::Categorical, data_type));
            } else if is_numeric(&data_type) {
                if let Some(&width) = binned.get(&name) {
                    if width > 0.0 && width.is_finite() {
                        dimensions.insert(
                            name.clone(),
                            Dimension::new(&name, DimensionKind::NumericBinned { width }, data_type.clone()),
                        );
                    } else {
                        tracing::warn!("Ignoring bin width {} for '{}': must be positive", width, name);
                    }
                }
                measures.insert(name, data_type);
            } else {
                tracing::debug!("Field '{}' of type {:?} is neither dimension nor measure", name, data_type);
            }
        }

        Self {
            source_name: source_name.into(),
            dimensions,
            measures,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.contains_key(name)
    }

    /// Dimensions in discovery (column) order
    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn dimension_names(&self) -> Vec<String> {
        self.dimensions.keys().cloned().collect()
    }

    pub fn is_measure(&self, name: &str) -> bool {
        self.measures.contains_key(name)
    }

    pub fn measure_names(&self) -> Vec<String> {
        self.measures.keys().cloned().collect()
    }
}
