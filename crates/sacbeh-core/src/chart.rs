//! Vega-Lite compatible chart specs for the rendering layer
//!
//! The x encoding comes from the path's grouping dimension, the y encoding from
//! its aggregation and measure. The declarative path is embedded under
//! `usermeta.path` so a spec can be turned back into the path that produced it.

use serde_json::{json, Map, Value};

use crate::error::{EngineError, Result};
use crate::path::{FilterValue, Path};
use crate::result::{AggregationResult, TOTAL_KEY};
use crate::schema::{DatasetSchema, DimensionKind};

pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

const MARKS: [&str; 3] = ["bar", "line", "text"];

/// Field name of the aggregated value in `data.values`
pub fn value_field(path: &Path) -> String {
    match &path.measure {
        Some(measure) if path.agg_fn.requires_measure() => format!("{}_{}", path.agg_fn, measure),
        _ => path.agg_fn.to_string(),
    }
}

fn axis_title(path: &Path) -> String {
    match &path.measure {
        Some(measure) if path.agg_fn.requires_measure() => format!("{}({})", path.agg_fn, measure),
        _ => "count".to_string(),
    }
}

/// Build the chart spec for `result`, the output of executing `path`
pub fn to_chart_spec(path: &Path, result: &AggregationResult, schema: &DatasetSchema) -> Result<Value> {
    let x_field = path.group_by.clone().unwrap_or_else(|| TOTAL_KEY.to_string());
    let y_field = value_field(path);

    let dimension = path.group_by.as_deref().and_then(|name| schema.dimension(name));
    let (mark, x_type) = match dimension.map(|d| d.kind) {
        Some(DimensionKind::Temporal) => ("line", "temporal"),
        Some(DimensionKind::NumericBinned { .. }) => ("bar", "ordinal"),
        Some(DimensionKind::Categorical) => ("bar", "nominal"),
        None => ("text", "nominal"),
    };
    let x_title = dimension.map(|d| d.label.clone()).unwrap_or_else(|| "All rows".to_string());

    let values: Vec<Value> = result
        .rows
        .iter()
        .map(|row| {
            let mut record = Map::new();
            record.insert(x_field.clone(), Value::String(row.key.clone()));
            record.insert(y_field.clone(), json!(row.value));
            Value::Object(record)
        })
        .collect();

    let transform: Vec<Value> = path
        .filters
        .iter()
        .map(|filter| match &filter.value {
            FilterValue::One(value) => json!({"filter": {"field": filter.dimension, "equal": value}}),
            FilterValue::Set(values) => json!({"filter": {"field": filter.dimension, "oneOf": values}}),
        })
        .collect();

    Ok(json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": title(path, schema),
        "data": {"values": values},
        "transform": transform,
        "mark": mark,
        "encoding": {
            "x": {"field": x_field, "type": x_type, "title": x_title, "sort": null},
            "y": {"field": y_field, "type": "quantitative", "title": axis_title(path)},
        },
        "usermeta": {
            "path": path.to_value()?,
            "totalGroups": result.total_groups,
            "truncated": result.truncated,
        },
    }))
}

fn title(path: &Path, schema: &DatasetSchema) -> String {
    let measure = match &path.measure {
        Some(measure) if path.agg_fn.requires_measure() => format!("{} of {}", path.agg_fn, measure),
        _ => "Row count".to_string(),
    };
    let by = path
        .group_by
        .as_deref()
        .map(|name| {
            let label = schema.dimension(name).map(|d| d.label.as_str()).unwrap_or(name);
            format!(" by {}", label)
        })
        .unwrap_or_default();
    let trail = if path.filters.is_empty() {
        String::new()
    } else {
        let parts: Vec<String> = path.filters.iter().map(ToString::to_string).collect();
        format!(" ({})", parts.join(", "))
    };
    format!("{}{}{}", measure, by, trail)
}

/// Recover the path embedded in a chart spec
pub fn path_from_chart_spec(spec: &Value) -> Result<Path> {
    let embedded = spec
        .pointer("/usermeta/path")
        .cloned()
        .ok_or_else(|| EngineError::ChartSpec("usermeta.path is missing".to_string()))?;
    Path::from_value(embedded)
}

/// Check the grouping/encoding grammar of a spec and its consistency with the embedded path
pub fn validate_chart_spec(spec: &Value) -> Result<()> {
    let mark = spec
        .get("mark")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::ChartSpec("mark must be a string".to_string()))?;
    if !MARKS.contains(&mark) {
        return Err(EngineError::ChartSpec(format!("unsupported mark '{}'", mark)));
    }

    let field = |channel: &str| {
        spec.pointer(&format!("/encoding/{}/field", channel))
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::ChartSpec(format!("encoding.{}.field is missing", channel)))
    };
    let x_field = field("x")?;
    let y_field = field("y")?;

    if spec.pointer("/encoding/y/type").and_then(Value::as_str) != Some("quantitative") {
        return Err(EngineError::ChartSpec("encoding.y must be quantitative".to_string()));
    }

    let values = spec
        .pointer("/data/values")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::ChartSpec("data.values must be an array".to_string()))?;
    for record in values {
        if record.get(x_field).is_none() || !record.get(y_field).is_some_and(Value::is_number) {
            return Err(EngineError::ChartSpec(format!(
                "data record {} does not carry '{}' and '{}'",
                record, x_field, y_field
            )));
        }
    }

    let path = path_from_chart_spec(spec)?;
    let expected_x = path.group_by.as_deref().unwrap_or(TOTAL_KEY);
    if expected_x != x_field || value_field(&path) != y_field {
        return Err(EngineError::ChartSpec(format!(
            "encoding ({}, {}) does not match path {}",
            x_field, y_field, path
        )));
    }

    Ok(())
}
