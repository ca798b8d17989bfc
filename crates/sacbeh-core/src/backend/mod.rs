//! Aggregation backend contract
//!
//! A backend turns an [`AggregateRequest`] into an [`AggregationResult`] for an
//! open source handle. Implementations must:
//! - cap the result at `row_limit` and set `truncated` instead of dropping silently
//! - order rows by descending value then ascending key (see [`crate::result::sort_rows`])
//! - return identical rows for identical requests over unchanged data

mod memory;

pub use memory::MemoryBackend;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connector::SourceHandle;
use crate::error::{EngineError, Operation, Result};
use crate::path::{validate_for, AggFn, FilterValue, Path};
use crate::result::AggregationResult;
use crate::schema::{DatasetSchema, Dimension};

/// A filter resolved against the schema
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub dimension: Dimension,
    pub value: FilterValue,
}

/// Everything a backend needs to compute one view
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub filters: Vec<FilterClause>,
    /// `None` aggregates all matching rows into a single group
    pub group_by: Option<Dimension>,
    pub measure: Option<String>,
    pub agg_fn: AggFn,
    pub row_limit: usize,
}

impl AggregateRequest {
    /// Validate `path` against `schema` and resolve its dimensions
    pub fn for_path(path: &Path, schema: &DatasetSchema, row_limit: usize) -> Result<Self> {
        validate_for(path, schema, Operation::CurrentResult)?;

        let resolve = |name: &str| {
            schema
                .dimension(name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownDimension {
                    operation: Operation::CurrentResult,
                    dimension: name.to_string(),
                })
        };

        let filters = path
            .filters
            .iter()
            .map(|filter| {
                Ok(FilterClause {
                    dimension: resolve(&filter.dimension)?,
                    value: filter.value.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let group_by = path.group_by.as_deref().map(resolve).transpose()?;

        Ok(Self {
            filters,
            group_by,
            measure: path.measure.clone(),
            agg_fn: path.agg_fn,
            row_limit,
        })
    }

    /// Backend failure tagged with this request
    pub fn failure(&self, backend: &str, message: impl Into<String>) -> EngineError {
        EngineError::Backend {
            operation: Operation::Aggregate,
            backend: backend.to_string(),
            path: self.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AggregateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.measure {
            Some(measure) => write!(f, "{}({})", self.agg_fn, measure)?,
            None => write!(f, "{}(*)", self.agg_fn)?,
        }
        if let Some(group_by) = &self.group_by {
            write!(f, " by {}", group_by.field)?;
        }
        for (idx, clause) in self.filters.iter().enumerate() {
            let sep = if idx == 0 { " where" } else { " and" };
            write!(f, "{} {}={}", sep, clause.dimension.field, clause.value)?;
        }
        write!(f, " limit {}", self.row_limit)
    }
}

/// Pluggable execution engine computing grouped results
#[async_trait]
pub trait AggregationBackend: Send + Sync {
    /// Registry tag of the backend
    fn name(&self) -> &str;

    /// Whether this backend can execute against `handle`
    fn supports(&self, handle: &dyn SourceHandle) -> bool {
        let _ = handle;
        true
    }

    async fn aggregate(
        &self,
        handle: Arc<dyn SourceHandle>,
        request: &AggregateRequest,
    ) -> Result<AggregationResult>;
}
