use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::{AggFn, FilterValue, Path};

mod query;
mod session;
mod subscriber;

#[cfg(test)]
mod properties;

pub use query::QueryTicket;
pub use session::TraversalSession;
pub use subscriber::TraversalSubscriber;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TraversalState {
    /// No dataset loaded
    Empty,
    /// Dataset loaded, unfiltered root path, empty history
    Rooted,
    /// `depth` ancestors on the history stack
    Drilled { depth: usize },
    /// Torn down; no further operations are accepted
    Closed,
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalState::Empty => f.write_str("Empty"),
            TraversalState::Rooted => f.write_str("Rooted"),
            TraversalState::Drilled { depth } => write!(f, "Drilled(depth={})", depth),
            TraversalState::Closed => f.write_str("Closed"),
        }
    }
}

/// Defaults used to build the root path on load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSeed {
    /// Initial grouping; the first discovered dimension when absent
    pub group_by: Option<String>,
    pub measure: Option<String>,
    pub agg_fn: AggFn,
    /// Drill order overriding the engine configuration
    pub drill_order: Vec<String>,
}

impl PathSeed {
    pub fn new(group_by: impl Into<String>, measure: Option<&str>, agg_fn: AggFn) -> Self {
        Self {
            group_by: Some(group_by.into()),
            measure: measure.map(str::to_string),
            agg_fn,
            drill_order: Vec::new(),
        }
    }

    pub fn with_drill_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drill_order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Seed taken from an advisor's suggestion. The suggested path's filters are
    /// ignored (the root is always unfiltered) and every name is validated again
    /// on load.
    pub fn from_advice(advice: &Advice) -> Self {
        let (group_by, measure, agg_fn) = match &advice.suggested_path {
            Some(path) => (path.group_by.clone(), path.measure.clone(), path.agg_fn),
            None => (None, None, AggFn::Count),
        };
        Self {
            group_by,
            measure,
            agg_fn,
            drill_order: advice.ranked_dimensions.clone(),
        }
    }
}

/// Output of an external analysis component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advice {
    pub suggested_path: Option<Path>,
    /// Candidate dimensions, most relevant first
    #[serde(default)]
    pub ranked_dimensions: Vec<String>,
}

/// One step of the filter trail, for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub dimension: String,
    pub label: String,
    pub value: FilterValue,
}

/// Snapshot of a session handed to subscribers and the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalContext {
    pub state: TraversalState,
    pub path: Option<Path>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub dimensions: Vec<String>,
    pub measures: Vec<String>,
}
