//! Aggregation results

use serde::{Deserialize, Serialize};

/// Key used for the single row of an ungrouped path
pub const TOTAL_KEY: &str = "(all)";

/// One group of an aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: String,
    pub value: f64,
}

impl AggregateRow {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Output of executing a path against a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    /// Groups in rendering order
    pub rows: Vec<AggregateRow>,
    /// Number of groups before the row limit was applied
    pub total_groups: usize,
    /// Whether groups were cut off by the row limit
    pub truncated: bool,
    pub row_limit: usize,
}

/// Descending aggregated value, then ascending key.
///
/// Every backend orders through this function so charts stay stable when the
/// backend is swapped.
pub fn sort_rows(rows: &mut [AggregateRow]) {
    rows.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
}

impl AggregationResult {
    /// Order the complete set of groups and apply the row limit
    pub fn from_groups(groups: Vec<AggregateRow>, row_limit: usize) -> Self {
        let total_groups = groups.len();
        Self::from_partial(groups, total_groups, row_limit)
    }

    /// Order `rows` and apply the row limit when the backend already knows the
    /// total group count (and may have fetched only the leading groups)
    pub fn from_partial(mut rows: Vec<AggregateRow>, total_groups: usize, row_limit: usize) -> Self {
        sort_rows(&mut rows);
        rows.truncate(row_limit);
        let total_groups = total_groups.max(rows.len());
        Self {
            truncated: total_groups > rows.len(),
            rows,
            total_groups,
            row_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rows.iter().any(|row| row.key == key)
    }

    pub fn value_of(&self, key: &str) -> Option<f64> {
        self.rows.iter().find(|row| row.key == key).map(|row| row.value)
    }

    /// Sum of the values of all returned rows
    pub fn grand_total(&self) -> f64 {
        self.rows.iter().map(|row| row.value).sum()
    }
}
