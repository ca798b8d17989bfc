//! Aggregation pushed down to a relational source as a single SQL query

use std::sync::Arc;

use arrow::datatypes::DataType;
use async_trait::async_trait;
use sacbeh_core::result::TOTAL_KEY;
use sacbeh_core::{
    AggFn, AggregateRequest, AggregateRow, AggregationBackend, AggregationResult, Dimension, FilterClause,
    Result, SourceHandle, SqlValue,
};

use crate::sources::sqlite_source::quote_ident;

const BACKEND_NAME: &str = "sql";

/// Backend that groups, aggregates, orders and limits inside the database.
///
/// Only sources exposing relational access are supported. Group keys are
/// rendered the same way the in-memory backend renders them, so both
/// backends return identical rows for the same request.
#[derive(Debug, Default, Clone)]
pub struct SqlBackend;

impl SqlBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AggregationBackend for SqlBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn supports(&self, handle: &dyn SourceHandle) -> bool {
        handle.relational().is_some()
    }

    async fn aggregate(
        &self,
        handle: Arc<dyn SourceHandle>,
        request: &AggregateRequest,
    ) -> Result<AggregationResult> {
        let owned = request.clone();
        tokio::task::spawn_blocking(move || -> Result<AggregationResult> {
            let relational = handle
                .relational()
                .ok_or_else(|| owned.failure(BACKEND_NAME, "source has no relational access"))?;
            let query = SqlQuery::build(&owned, relational.table_name());
            let rows = relational
                .query_rows(&query.sql, &query.params)
                .map_err(|e| owned.failure(BACKEND_NAME, e.to_string()))?;
            Ok(collect(&owned, rows))
        })
        .await
        .map_err(|e| request.failure(BACKEND_NAME, e.to_string()))?
    }
}

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlQuery {
    /// Grouped requests select `(key, value, group count)`; ungrouped ones `(value, measure count)`
    pub fn build(request: &AggregateRequest, table: &str) -> Self {
        let mut params = Vec::new();
        let mut conditions = Vec::new();

        if let Some(group_by) = &request.group_by {
            conditions.push(format!("{} IS NOT NULL", key_expr(group_by)));
        }
        for clause in &request.filters {
            conditions.push(filter_condition(clause, &mut params));
        }

        let measure = match (request.agg_fn, request.measure.as_deref()) {
            (AggFn::Count, _) | (_, None) => None,
            (_, Some(measure)) => Some(quote_ident(measure)),
        };
        let value = match &measure {
            Some(column) => format!("{}({})", request.agg_fn.as_str().to_uppercase(), column),
            None => "COUNT(*)".to_string(),
        };

        let mut sql = match &request.group_by {
            Some(group_by) => format!(
                "SELECT {} AS k, {} AS v, COUNT(*) OVER () AS n FROM {}",
                key_expr(group_by),
                value,
                quote_ident(table)
            ),
            None => format!(
                "SELECT {} AS v, COUNT({}) AS c FROM {}",
                value,
                measure.as_deref().unwrap_or("*"),
                quote_ident(table)
            ),
        };

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if let Some(group_by) = &request.group_by {
            sql.push_str(" GROUP BY k");
            if let Some(column) = &measure {
                sql.push_str(&format!(" HAVING COUNT({}) > 0", column));
            }
            // Ties break on the rendered key so the cut agrees with the final ordering
            sql.push_str(" ORDER BY v DESC, CAST(k AS TEXT) COLLATE BINARY ASC");
            // Bin keys are rendered after the query, so their order is settled in Rust
            if group_by.bin_width().is_none() {
                sql.push_str(" LIMIT ?");
                params.push(SqlValue::Integer(request.row_limit as i64));
            }
        }

        Self { sql, params }
    }
}

/// Expression producing the group key of `dimension`
fn key_expr(dimension: &Dimension) -> String {
    let column = quote_ident(&dimension.field);
    match dimension.bin_width() {
        Some(width) => {
            let scaled = format!("({} / {:?})", column, width);
            format!("(CAST({s} AS INTEGER) - ({s} < CAST({s} AS INTEGER)))", s = scaled)
        }
        None if dimension.data_type == DataType::Boolean => format!(
            "(CASE WHEN {c} IS NULL THEN NULL WHEN {c} THEN 'true' ELSE 'false' END)",
            c = column
        ),
        None => column,
    }
}

fn filter_condition(clause: &FilterClause, params: &mut Vec<SqlValue>) -> String {
    let mut binds = Vec::new();
    for value in clause.value.values() {
        match clause.dimension.bin_width() {
            // Only labels the bins themselves produce can match
            Some(width) => match Dimension::parse_bin_label(width, value) {
                Some(index) if Dimension::bin_label(width, index) == value => binds.push(SqlValue::Integer(index)),
                _ => {}
            },
            None => binds.push(SqlValue::Text(value.to_string())),
        }
    }

    let expr = key_expr(&clause.dimension);
    let condition = match binds.len() {
        0 => "0 = 1".to_string(),
        1 => format!("{} = ?", expr),
        n => format!("{} IN ({})", expr, vec!["?"; n].join(", ")),
    };
    params.extend(binds);
    condition
}

fn group_key(dimension: &Dimension, value: &SqlValue) -> Option<String> {
    match (value, dimension.bin_width()) {
        (SqlValue::Null, _) => None,
        (SqlValue::Integer(index), Some(width)) => Some(Dimension::bin_label(width, *index)),
        (SqlValue::Integer(i), None) => Some(i.to_string()),
        (SqlValue::Real(f), _) => Some(f.to_string()),
        (SqlValue::Text(s), _) => Some(s.clone()),
    }
}

fn collect(request: &AggregateRequest, rows: Vec<Vec<SqlValue>>) -> AggregationResult {
    match &request.group_by {
        None => {
            let total = rows.first().and_then(|row| {
                let value = row.first()?.as_f64()?;
                let measured = row.get(1).and_then(SqlValue::as_i64).unwrap_or(0);
                (request.agg_fn == AggFn::Count || measured > 0).then(|| AggregateRow::new(TOTAL_KEY, value))
            });
            AggregationResult::from_groups(total.into_iter().collect(), request.row_limit)
        }
        Some(group_by) => {
            let total_groups = rows
                .first()
                .and_then(|row| row.get(2))
                .and_then(SqlValue::as_i64)
                .unwrap_or(0)
                .max(0) as usize;
            let groups = rows
                .iter()
                .filter_map(|row| {
                    let key = group_key(group_by, row.first()?)?;
                    let value = row.get(1)?.as_f64()?;
                    Some(AggregateRow::new(key, value))
                })
                .collect();
            AggregationResult::from_partial(groups, total_groups, request.row_limit)
        }
    }
}
