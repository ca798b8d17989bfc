//! Core functionality for the path-traversal engine
//!
//! This crate provides the path model, the traversal state machine and the
//! contracts that storage and compute backends plug into.

pub mod backend;
pub mod chart;
pub mod config;
pub mod connector;
pub mod error;
pub mod facade;
pub mod path;
pub mod registry;
pub mod result;
pub mod schema;
pub mod traversal;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use backend::{AggregateRequest, AggregationBackend, FilterClause, MemoryBackend};
pub use config::{EngineConfig, NullConfig, RowLimitPolicy, SourceConfig};
pub use connector::{MemoryConnector, MemoryHandle, RelationalAccess, SourceConnector, SourceHandle, SqlValue};
pub use error::{EngineError, Operation, Result};
pub use facade::{FacadeInfo, NavigationFacade, RenderEvent, SessionId};
pub use path::{validate, AggFn, Filter, FilterValue, Path};
pub use registry::ComponentRegistry;
pub use result::{AggregateRow, AggregationResult};
pub use schema::{DatasetSchema, Dimension, DimensionKind};
pub use traversal::{
    Advice, Breadcrumb, PathSeed, QueryTicket, TraversalContext, TraversalSession,
    TraversalState, TraversalSubscriber,
};
