//! Error taxonomy shared by every layer of the engine

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::path::AggFn;

/// Engine operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    DrillInto,
    Detour,
    GoBack,
    CurrentResult,
    Validate,
    Introspect,
    Open,
    Aggregate,
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load",
            Operation::DrillInto => "drill_into",
            Operation::Detour => "detour",
            Operation::GoBack => "go_back",
            Operation::CurrentResult => "current_result",
            Operation::Validate => "validate",
            Operation::Introspect => "introspect_schema",
            Operation::Open => "open",
            Operation::Aggregate => "aggregate",
            Operation::Close => "close",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while loading, navigating or executing paths
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{operation}: connection to '{source_name}' failed: {message}")]
    Connection {
        operation: Operation,
        source_name: String,
        message: String,
    },

    #[error("{operation}: schema of '{source_name}' could not be read: {message}")]
    SchemaIntrospection {
        operation: Operation,
        source_name: String,
        message: String,
    },

    #[error("{operation}: source '{source_name}' is not usable: {reason}")]
    InvalidSource {
        operation: Operation,
        source_name: String,
        reason: String,
    },

    #[error("{operation}: path {path} references fields missing from the schema: {}", missing.join(", "))]
    SchemaMismatch {
        operation: Operation,
        path: String,
        missing: Vec<String>,
    },

    #[error("{operation}: unknown dimension '{dimension}'")]
    UnknownDimension {
        operation: Operation,
        dimension: String,
    },

    #[error("{operation}: path {path} has no group-by dimension to filter on")]
    NoDimensionToFilter { operation: Operation, path: String },

    #[error("{operation}: value '{value}' of dimension '{dimension}' is not in the last computed result")]
    DimensionValueNotFound {
        operation: Operation,
        dimension: String,
        value: String,
    },

    #[error("{operation}: already at the root path")]
    AtRoot { operation: Operation },

    #[error("{operation}: path {path} uses '{agg_fn}' without a measure")]
    MissingMeasure {
        operation: Operation,
        path: String,
        agg_fn: AggFn,
    },

    #[error("{operation} is not allowed in state {state}")]
    InvalidState { operation: Operation, state: String },

    #[error("{operation}: backend '{backend}' failed on {path}: {message}")]
    Backend {
        operation: Operation,
        backend: String,
        path: String,
        message: String,
    },

    #[error("{operation}: result for path {path} was superseded by a newer navigation")]
    Superseded { operation: Operation, path: String },

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("no {kind} registered under '{tag}'")]
    UnknownComponent { kind: &'static str, tag: String },

    #[error("chart spec error: {0}")]
    ChartSpec(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the error leaves the session navigable and may simply be retried or ignored
    pub fn is_navigation_error(&self) -> bool {
        matches!(
            self,
            EngineError::AtRoot { .. }
                | EngineError::NoDimensionToFilter { .. }
                | EngineError::DimensionValueNotFound { .. }
                | EngineError::UnknownDimension { .. }
                | EngineError::Superseded { .. }
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
