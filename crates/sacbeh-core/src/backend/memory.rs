//! In-memory dataframe backend over arrow record batches

use std::sync::Arc;

use ahash::AHashMap;
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use async_trait::async_trait;
use rayon::prelude::*;

use super::{AggregateRequest, AggregationBackend};
use crate::connector::SourceHandle;
use crate::error::Result;
use crate::path::AggFn;
use crate::result::{AggregateRow, AggregationResult, TOTAL_KEY};
use crate::schema::Dimension;

const BACKEND_NAME: &str = "memory";

/// Backend that scans the handle's rows and groups them in memory.
///
/// Batches are aggregated in parallel and the partial states merged in batch
/// order, so floating point sums do not depend on thread scheduling.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AggregationBackend for MemoryBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn aggregate(
        &self,
        handle: Arc<dyn SourceHandle>,
        request: &AggregateRequest,
    ) -> Result<AggregationResult> {
        let owned = request.clone();
        tokio::task::spawn_blocking(move || {
            let batches = handle.scan()?;
            aggregate_batches(&batches, &owned)
        })
        .await
        .map_err(|e| request.failure(BACKEND_NAME, e.to_string()))?
    }
}

/// Group and aggregate `batches` according to `request`
pub fn aggregate_batches(batches: &[RecordBatch], request: &AggregateRequest) -> Result<AggregationResult> {
    let partials = batches
        .par_iter()
        .map(|batch| aggregate_batch(batch, request))
        .collect::<std::result::Result<Vec<_>, String>>()
        .map_err(|message| request.failure(BACKEND_NAME, message))?;

    let mut merged: AHashMap<String, Accumulator> = AHashMap::new();
    for partial in partials {
        for (key, acc) in partial {
            merged.entry(key).or_default().merge(&acc);
        }
    }
    if request.group_by.is_none() {
        merged.entry(TOTAL_KEY.to_string()).or_default();
    }

    let groups = merged
        .into_iter()
        .filter_map(|(key, acc)| acc.finish(request.agg_fn).map(|value| AggregateRow { key, value }))
        .collect();

    Ok(AggregationResult::from_groups(groups, request.row_limit))
}

fn aggregate_batch(
    batch: &RecordBatch,
    request: &AggregateRequest,
) -> std::result::Result<AHashMap<String, Accumulator>, String> {
    let filters = request
        .filters
        .iter()
        .map(|clause| Ok((KeyColumn::new(batch, &clause.dimension)?, &clause.value)))
        .collect::<std::result::Result<Vec<_>, String>>()?;
    let group = request
        .group_by
        .as_ref()
        .map(|dimension| KeyColumn::new(batch, dimension))
        .transpose()?;
    let measure = match (&request.measure, request.agg_fn) {
        (Some(name), agg_fn) if agg_fn != AggFn::Count => Some(numeric_column(batch, name)?),
        _ => None,
    };

    let mut groups: AHashMap<String, Accumulator> = AHashMap::new();

    'rows: for row in 0..batch.num_rows() {
        for (column, value) in &filters {
            match column.key(row)? {
                Some(key) if value.matches(&key) => {}
                _ => continue 'rows,
            }
        }

        let key = match &group {
            Some(column) => match column.key(row)? {
                Some(key) => key,
                None => continue,
            },
            None => TOTAL_KEY.to_string(),
        };

        let acc = groups.entry(key).or_default();
        acc.rows += 1;
        if let Some(values) = &measure {
            if values.is_valid(row) && !values.value(row).is_nan() {
                acc.push(values.value(row));
            }
        }
    }

    Ok(groups)
}

fn numeric_column(batch: &RecordBatch, name: &str) -> std::result::Result<Float64Array, String> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| format!("measure column '{}' not found", name))?;
    let values = cast(column.as_ref(), &DataType::Float64).map_err(|e| e.to_string())?;
    values
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| format!("measure column '{}' is not numeric", name))
}

/// Renders the group key of a dimension column row by row
enum KeyColumn {
    Text(StringArray),
    Binned { values: Float64Array, width: f64 },
    Display(ArrayRef),
}

impl KeyColumn {
    fn new(batch: &RecordBatch, dimension: &Dimension) -> std::result::Result<Self, String> {
        let column = batch
            .column_by_name(&dimension.field)
            .ok_or_else(|| format!("dimension column '{}' not found", dimension.field))?;

        if let Some(width) = dimension.bin_width() {
            let values = numeric_column(batch, &dimension.field)?;
            return Ok(KeyColumn::Binned { values, width });
        }

        Ok(match column.as_any().downcast_ref::<StringArray>() {
            Some(strings) => KeyColumn::Text(strings.clone()),
            None => KeyColumn::Display(column.clone()),
        })
    }

    fn key(&self, row: usize) -> std::result::Result<Option<String>, String> {
        match self {
            KeyColumn::Text(strings) => Ok(strings.is_valid(row).then(|| strings.value(row).to_string())),
            KeyColumn::Binned { values, width } => {
                if values.is_null(row) || values.value(row).is_nan() {
                    return Ok(None);
                }
                let index = Dimension::bin_index(*width, values.value(row));
                Ok(Some(Dimension::bin_label(*width, index)))
            }
            KeyColumn::Display(array) => {
                if array.is_null(row) {
                    return Ok(None);
                }
                array_value_to_string(array.as_ref(), row)
                    .map(Some)
                    .map_err(|e| e.to_string())
            }
        }
    }
}

/// Running aggregation state of one group
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    /// Rows in the group
    rows: u64,
    /// Non-null measure values
    count: u64,
    sum: f64,
    /// Running error of `sum` (Kahan-Babuska-Neumaier), matching SQLite's SUM and AVG
    compensation: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.add_to_sum(value);
    }

    fn add_to_sum(&mut self, value: f64) {
        let total = self.sum + value;
        if self.sum.abs() > value.abs() {
            self.compensation += (self.sum - total) + value;
        } else {
            self.compensation += (value - total) + self.sum;
        }
        self.sum = total;
    }

    fn total(&self) -> f64 {
        if self.compensation.is_nan() {
            self.sum
        } else {
            self.sum + self.compensation
        }
    }

    fn merge(&mut self, other: &Accumulator) {
        if other.count > 0 {
            if self.count == 0 {
                self.min = other.min;
                self.max = other.max;
            } else {
                self.min = self.min.min(other.min);
                self.max = self.max.max(other.max);
            }
        }
        self.rows += other.rows;
        self.count += other.count;
        self.add_to_sum(other.sum);
        self.compensation += other.compensation;
    }

    /// `None` when the group has no measure values to aggregate
    fn finish(&self, agg_fn: AggFn) -> Option<f64> {
        if agg_fn == AggFn::Count {
            return Some(self.rows as f64);
        }
        if self.count == 0 {
            return None;
        }
        Some(match agg_fn {
            AggFn::Count => self.rows as f64,
            AggFn::Sum => self.total(),
            AggFn::Avg => self.total() / self.count as f64,
            AggFn::Min => self.min,
            AggFn::Max => self.max,
        })
    }
}
