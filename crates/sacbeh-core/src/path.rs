//! Declarative path model
//!
//! A [`Path`] is the unit of navigable state: the filter trail from the root,
//! the grouping dimension of the current level and the aggregation to apply.
//! It serializes to the document
//! `{filters: [{dimension, value}], groupBy, measure, aggFn}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Operation, Result};
use crate::schema::DatasetSchema;

/// Aggregation function applied to the measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFn {
    #[default]
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFn {
    pub const ALL: [AggFn; 5] = [AggFn::Count, AggFn::Sum, AggFn::Avg, AggFn::Min, AggFn::Max];

    /// Every function except `count` needs a measure field
    pub fn requires_measure(self) -> bool {
        !matches!(self, AggFn::Count)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggFn::Count => "count",
            AggFn::Sum => "sum",
            AggFn::Avg => "avg",
            AggFn::Min => "min",
            AggFn::Max => "max",
        }
    }
}

impl fmt::Display for AggFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggFn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        AggFn::ALL
            .into_iter()
            .find(|agg| agg.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::Config(format!("unknown aggregation function '{}'", s)))
    }
}

/// Value(s) matched by a filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Set(Vec<String>),
}

impl FilterValue {
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            FilterValue::One(value) => value == candidate,
            FilterValue::Set(values) => values.iter().any(|v| v == candidate),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            FilterValue::One(value) => vec![value.as_str()],
            FilterValue::Set(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::One(value) => f.write_str(value),
            FilterValue::Set(values) => write!(f, "{{{}}}", values.join(", ")),
        }
    }
}

/// Constraint narrowing rows to one value (or value set) of a dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub dimension: String,
    pub value: FilterValue,
}

impl Filter {
    pub fn equals(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            value: FilterValue::One(value.into()),
        }
    }

    pub fn one_of<I, S>(dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dimension: dimension.into(),
            value: FilterValue::Set(values.into_iter().map(Into::into).collect()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FilterValue::One(value) => write!(f, "{}={}", self.dimension, value),
            FilterValue::Set(_) => write!(f, "{} in {}", self.dimension, self.value),
        }
    }
}

/// Serializable description of one aggregated view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<String>,
    #[serde(default)]
    pub agg_fn: AggFn,
}

impl Path {
    /// Root path: no filters
    pub fn root(group_by: Option<String>, measure: Option<String>, agg_fn: AggFn) -> Self {
        Self {
            filters: Vec::new(),
            group_by,
            measure,
            agg_fn,
        }
    }

    /// Number of filters on the trail
    pub fn depth(&self) -> usize {
        self.filters.len()
    }

    pub fn is_root(&self) -> bool {
        self.filters.is_empty()
    }

    /// The path one level down: the current grouping fixed to `value`,
    /// grouped by `next_group_by`. `None` when there is nothing to filter on.
    pub fn drilled(&self, value: &str, next_group_by: Option<String>) -> Option<Path> {
        let dimension = self.group_by.as_ref()?;
        let mut filters = self.filters.clone();
        filters.push(Filter::equals(dimension.clone(), value));
        Some(Path {
            filters,
            group_by: next_group_by,
            measure: self.measure.clone(),
            agg_fn: self.agg_fn,
        })
    }

    /// The same trail re-sliced by another dimension
    pub fn with_group_by(&self, dimension: impl Into<String>) -> Path {
        Path {
            group_by: Some(dimension.into()),
            ..self.clone()
        }
    }

    /// Whether this path's trail starts with every filter of `ancestor`
    pub fn extends(&self, ancestor: &Path) -> bool {
        self.filters.len() >= ancestor.filters.len()
            && self.filters[..ancestor.filters.len()] == ancestor.filters[..]
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, filter) in self.filters.iter().enumerate() {
            if idx > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{}", filter)?;
        }
        f.write_str("] ")?;
        match &self.group_by {
            Some(group_by) => write!(f, "by {} ", group_by)?,
            None => f.write_str("ungrouped ")?,
        }
        match &self.measure {
            Some(measure) => write!(f, "{}({})", self.agg_fn, measure),
            None => write!(f, "{}(*)", self.agg_fn),
        }
    }
}

/// Check every dimension and measure `path` references against `schema`
pub fn validate(path: &Path, schema: &DatasetSchema) -> Result<()> {
    validate_for(path, schema, Operation::Validate)
}

pub(crate) fn validate_for(path: &Path, schema: &DatasetSchema, operation: Operation) -> Result<()> {
    let mut missing: Vec<String> = Vec::new();
    let mut note = |name: &str| {
        if !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    };

    for filter in &path.filters {
        if !schema.has_dimension(&filter.dimension) {
            note(&filter.dimension);
        }
    }
    if let Some(group_by) = &path.group_by {
        if !schema.has_dimension(group_by) {
            note(group_by);
        }
    }
    if let Some(measure) = &path.measure {
        if !schema.is_measure(measure) {
            note(measure);
        }
    }

    if !missing.is_empty() {
        return Err(EngineError::SchemaMismatch {
            operation,
            path: path.to_string(),
            missing,
        });
    }

    if path.agg_fn.requires_measure() && path.measure.is_none() {
        return Err(EngineError::MissingMeasure {
            operation,
            path: path.to_string(),
            agg_fn: path.agg_fn,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use indexmap::IndexMap;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn schema() -> DatasetSchema {
        let arrow = Arc::new(Schema::new(vec![
            Field::new("region", DataType::Utf8, false),
            Field::new("product", DataType::Utf8, false),
            Field::new("sales", DataType::Float64, true),
        ]));
        DatasetSchema::discover("test", arrow, &IndexMap::new())
    }

    fn drilled_path() -> Path {
        Path {
            filters: vec![
                Filter::equals("region", "West"),
                Filter::one_of("product", ["Chair", "Desk"]),
            ],
            group_by: Some("quarter".to_string()),
            measure: Some("sales".to_string()),
            agg_fn: AggFn::Sum,
        }
    }

    #[test]
    fn test_round_trip() {
        let paths = vec![
            Path::root(None, None, AggFn::Count),
            Path::root(Some("region".into()), Some("sales".into()), AggFn::Avg),
            drilled_path(),
        ];

        for path in paths {
            let json = path.to_json().unwrap();
            assert_eq!(Path::from_json(&json).unwrap(), path);
        }
    }

    fn arb_filter_value() -> impl Strategy<Value = FilterValue> {
        prop_oneof![
            any::<String>().prop_map(FilterValue::One),
            prop::collection::vec(any::<String>(), 0..4).prop_map(FilterValue::Set),
        ]
    }

    fn arb_path() -> impl Strategy<Value = Path> {
        let filter = ("[a-z_]{1,10}", arb_filter_value()).prop_map(|(dimension, value)| Filter { dimension, value });
        (
            prop::collection::vec(filter, 0..5),
            prop::option::of("[a-z_]{1,10}"),
            prop::option::of("[a-z_]{1,10}"),
            prop::sample::select(AggFn::ALL.to_vec()),
        )
            .prop_map(|(filters, group_by, measure, agg_fn)| Path {
                filters,
                group_by,
                measure,
                agg_fn,
            })
    }

    proptest! {
        #[test]
        fn prop_round_trip(path in arb_path()) {
            let json = path.to_json().unwrap();
            prop_assert_eq!(&Path::from_json(&json).unwrap(), &path);

            let value = path.to_value().unwrap();
            prop_assert_eq!(Path::from_value(value).unwrap(), path);
        }
    }

    #[test]
    fn test_document_shape() {
        let value = drilled_path().to_value().unwrap();

        assert_eq!(value["filters"][0]["dimension"], "region");
        assert_eq!(value["filters"][0]["value"], "West");
        assert_eq!(value["filters"][1]["value"][1], "Desk");
        assert_eq!(value["groupBy"], "quarter");
        assert_eq!(value["measure"], "sales");
        assert_eq!(value["aggFn"], "sum");
    }

    #[test]
    fn test_validate_lists_every_missing_field() {
        let err = validate(&drilled_path(), &schema()).unwrap_err();
        match err {
            EngineError::SchemaMismatch { missing, .. } => assert_eq!(missing, vec!["quarter"]),
            other => panic!("unexpected error: {other}"),
        }

        let mut path = drilled_path();
        path.filters.push(Filter::equals("channel", "Online"));
        path.measure = Some("profit".into());
        match validate(&path, &schema()).unwrap_err() {
            EngineError::SchemaMismatch { missing, .. } => {
                assert_eq!(missing, vec!["channel", "quarter", "profit"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_requires_measure() {
        let path = Path::root(Some("region".into()), None, AggFn::Sum);
        assert!(matches!(
            validate(&path, &schema()),
            Err(EngineError::MissingMeasure { .. })
        ));
        assert!(validate(&Path::root(Some("region".into()), None, AggFn::Count), &schema()).is_ok());
    }

    #[test]
    fn test_drilled_extends_parent() {
        let root = Path::root(Some("region".into()), Some("sales".into()), AggFn::Sum);
        let child = root.drilled("West", Some("product".into())).unwrap();

        assert_eq!(child.filters, vec![Filter::equals("region", "West")]);
        assert_eq!(child.group_by.as_deref(), Some("product"));
        assert!(child.extends(&root));
        assert!(!root.extends(&child));
        assert!(Path::root(None, None, AggFn::Count).drilled("x", None).is_none());
    }

    #[test]
    fn test_agg_fn_parse() {
        assert_eq!("SUM".parse::<AggFn>().unwrap(), AggFn::Sum);
        assert!("median".parse::<AggFn>().is_err());
    }
}
