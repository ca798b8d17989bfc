//! Traversal state machine for one loaded dataset

use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{Breadcrumb, PathSeed, QueryTicket, TraversalContext, TraversalState};
use crate::backend::{AggregateRequest, AggregationBackend};
use crate::config::EngineConfig;
use crate::connector::{SourceConnector, SourceHandle};
use crate::error::{EngineError, Operation, Result};
use crate::path::{validate_for, Path};
use crate::result::AggregationResult;
use crate::schema::DatasetSchema;

/// Resources bound to the loaded dataset
struct LoadedSource {
    connector: Arc<dyn SourceConnector>,
    backend: Arc<dyn AggregationBackend>,
    handle: Arc<dyn SourceHandle>,
    schema: Arc<DatasetSchema>,
    row_limit: usize,
    drill_order: Vec<String>,
}

struct Traversal {
    source: LoadedSource,
    current: Path,
    history: Vec<Path>,
    /// Result of `current`, if computed since the last navigation
    last_result: Option<Arc<AggregationResult>>,
}

impl Traversal {
    fn state(&self) -> TraversalState {
        if self.history.is_empty() {
            TraversalState::Rooted
        } else {
            TraversalState::Drilled {
                depth: self.history.len(),
            }
        }
    }

    /// First dimension of the drill order that is neither filtered nor being drilled
    fn next_undrilled(&self, drilling: &str) -> Option<String> {
        self.source
            .drill_order
            .iter()
            .find(|name| {
                name.as_str() != drilling && !self.current.filters.iter().any(|f| &f.dimension == *name)
            })
            .cloned()
    }
}

enum Phase {
    Empty,
    Active(Box<Traversal>),
    Closed,
}

/// One user's traversal over one dataset.
///
/// Every navigation either fully succeeds or leaves the session untouched.
/// Results are computed on demand for the current path; a result computed for
/// a path the session has since left is discarded.
pub struct TraversalSession {
    config: Arc<EngineConfig>,
    phase: Phase,
    /// Bumped on every navigation; tickets from older generations are stale
    generation: u64,
    next_seq: u64,
    applied_seq: u64,
    in_flight: Vec<AbortHandle>,
}

impl TraversalSession {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            phase: Phase::Empty,
            generation: 0,
            next_seq: 0,
            applied_seq: 0,
            in_flight: Vec::new(),
        }
    }

    pub fn state(&self) -> TraversalState {
        match &self.phase {
            Phase::Empty => TraversalState::Empty,
            Phase::Active(traversal) => traversal.state(),
            Phase::Closed => TraversalState::Closed,
        }
    }

    fn active(&self, operation: Operation) -> Result<&Traversal> {
        match &self.phase {
            Phase::Active(traversal) => Ok(traversal),
            _ => Err(EngineError::InvalidState {
                operation,
                state: self.state().to_string(),
            }),
        }
    }

    fn active_mut(&mut self, operation: Operation) -> Result<&mut Traversal> {
        let state = self.state();
        match &mut self.phase {
            Phase::Active(traversal) => Ok(traversal),
            _ => Err(EngineError::InvalidState {
                operation,
                state: state.to_string(),
            }),
        }
    }

    /// Invalidate outstanding queries
    fn advance_generation(&mut self) {
        self.generation += 1;
        for task in self.in_flight.drain(..) {
            task.abort();
        }
    }

    /// Load a dataset and move to the root path.
    ///
    /// Only valid on an empty session. On failure the session stays empty and
    /// any handle acquired along the way is released.
    pub async fn load(
        &mut self,
        connector: Arc<dyn SourceConnector>,
        backend: Arc<dyn AggregationBackend>,
        seed: PathSeed,
    ) -> Result<Path> {
        let operation = Operation::Load;
        if !matches!(self.phase, Phase::Empty) {
            return Err(EngineError::InvalidState {
                operation,
                state: self.state().to_string(),
            });
        }

        let source_name = connector.source_name().to_string();
        info!("Loading '{}' ({}) with backend '{}'", source_name, connector.kind(), backend.name());

        let arrow = connector.introspect_schema().await?;
        if arrow.fields().is_empty() {
            return Err(EngineError::InvalidSource {
                operation,
                source_name,
                reason: "source has no columns".to_string(),
            });
        }

        let schema = DatasetSchema::discover(&source_name, arrow, &self.config.binned_dimensions);
        let first_dimension = schema.dimensions().next().map(|d| d.field.clone());
        if first_dimension.is_none() {
            return Err(EngineError::InvalidSource {
                operation,
                source_name,
                reason: "no groupable dimensions".to_string(),
            });
        }

        let group_by = seed.group_by.clone().or(first_dimension);
        let root = Path::root(group_by, seed.measure.clone(), seed.agg_fn);
        validate_for(&root, &schema, operation)?;

        let drill_order = self.resolve_drill_order(&seed, &schema);
        let row_estimate = connector.row_count_estimate().await?;
        let row_limit = self.config.row_limit.limit_for(row_estimate);

        let handle = connector.open().await?;
        if !backend.supports(handle.as_ref()) {
            if let Err(e) = handle.close() {
                warn!("Failed to release '{}' after rejected load: {}", source_name, e);
            }
            return Err(EngineError::InvalidSource {
                operation,
                source_name,
                reason: format!("backend '{}' cannot execute against this source", backend.name()),
            });
        }

        info!(
            "Loaded '{}': {} dimensions, ~{} rows, row limit {}, root {}",
            source_name,
            schema.dimension_names().len(),
            row_estimate,
            row_limit,
            root
        );

        self.phase = Phase::Active(Box::new(Traversal {
            source: LoadedSource {
                connector,
                backend,
                handle,
                schema: Arc::new(schema),
                row_limit,
                drill_order,
            },
            current: root.clone(),
            history: Vec::new(),
            last_result: None,
        }));
        self.advance_generation();
        Ok(root)
    }

    fn resolve_drill_order(&self, seed: &PathSeed, schema: &DatasetSchema) -> Vec<String> {
        let configured = if seed.drill_order.is_empty() {
            &self.config.drill_order
        } else {
            &seed.drill_order
        };

        let order: Vec<String> = configured
            .iter()
            .filter(|name| {
                let known = schema.has_dimension(name);
                if !known {
                    warn!("Dropping unknown dimension '{}' from drill order", name);
                }
                known
            })
            .cloned()
            .collect();

        if order.is_empty() {
            schema.dimension_names()
        } else {
            order
        }
    }

    /// Narrow the current path to `value` of its grouping dimension.
    ///
    /// `value` must appear in the last computed result. The new path is grouped
    /// by `next_dimension`, or by the next undrilled dimension of the drill
    /// order when none is given.
    pub fn drill_into(&mut self, value: &str, next_dimension: Option<&str>) -> Result<Path> {
        let operation = Operation::DrillInto;
        let traversal = self.active(operation)?;

        let dimension = traversal
            .current
            .group_by
            .clone()
            .ok_or_else(|| EngineError::NoDimensionToFilter {
                operation,
                path: traversal.current.to_string(),
            })?;

        let observed = traversal.last_result.as_ref().is_some_and(|r| r.contains(value));
        if !observed {
            return Err(EngineError::DimensionValueNotFound {
                operation,
                dimension,
                value: value.to_string(),
            });
        }

        let next = match next_dimension {
            Some(name) if !traversal.source.schema.has_dimension(name) => {
                return Err(EngineError::UnknownDimension {
                    operation,
                    dimension: name.to_string(),
                });
            }
            Some(name) => Some(name.to_string()),
            None => traversal.next_undrilled(&dimension),
        };

        let child = traversal
            .current
            .drilled(value, next)
            .ok_or_else(|| EngineError::NoDimensionToFilter {
                operation,
                path: traversal.current.to_string(),
            })?;
        debug_assert!(child.extends(&traversal.current));

        let traversal = self.active_mut(operation)?;
        let parent = std::mem::replace(&mut traversal.current, child.clone());
        traversal.history.push(parent);
        traversal.last_result = None;
        self.advance_generation();

        debug!("Drilled into {}={} -> {}", dimension, value, child);
        Ok(child)
    }

    /// Re-slice the current trail by another dimension without adding history
    pub fn detour(&mut self, dimension: &str) -> Result<Path> {
        let operation = Operation::Detour;
        let traversal = self.active(operation)?;
        if !traversal.source.schema.has_dimension(dimension) {
            return Err(EngineError::UnknownDimension {
                operation,
                dimension: dimension.to_string(),
            });
        }
        if traversal.current.group_by.as_deref() == Some(dimension) {
            return Ok(traversal.current.clone());
        }

        let next = traversal.current.with_group_by(dimension);
        let traversal = self.active_mut(operation)?;
        traversal.current = next.clone();
        traversal.last_result = None;
        self.advance_generation();

        debug!("Detoured to {}", next);
        Ok(next)
    }

    /// Restore the previous path
    pub fn go_back(&mut self) -> Result<Path> {
        let operation = Operation::GoBack;
        let traversal = self.active_mut(operation)?;
        let parent = traversal.history.pop().ok_or(EngineError::AtRoot { operation })?;
        traversal.current = parent.clone();
        traversal.last_result = None;
        self.advance_generation();

        debug!("Went back to {}", parent);
        Ok(parent)
    }

    /// Snapshot a request for the current path
    pub fn begin_query(&mut self) -> Result<QueryTicket> {
        let traversal = self.active(Operation::CurrentResult)?;
        let source = &traversal.source;
        let request = AggregateRequest::for_path(&traversal.current, &source.schema, source.row_limit)?;
        let ticket = QueryTicket {
            seq: self.next_seq + 1,
            generation: self.generation,
            path: traversal.current.clone(),
            request,
            handle: source.handle.clone(),
            backend: source.backend.clone(),
        };
        self.next_seq = ticket.seq;
        Ok(ticket)
    }

    /// Register a running query so the next navigation can cancel it
    pub fn track_in_flight(&mut self, task: AbortHandle) {
        self.in_flight.retain(|t| !t.is_finished());
        self.in_flight.push(task);
    }

    /// Apply the outcome of `ticket`, unless the session moved on since it was issued
    pub fn complete_query(
        &mut self,
        ticket: &QueryTicket,
        outcome: Result<AggregationResult>,
    ) -> Result<Arc<AggregationResult>> {
        let operation = Operation::CurrentResult;
        let stale = ticket.generation != self.generation || ticket.seq <= self.applied_seq;
        if stale || !matches!(self.phase, Phase::Active(_)) {
            debug!("Discarding result of query {} for {}", ticket.seq, ticket.path);
            return Err(EngineError::Superseded {
                operation,
                path: ticket.path.to_string(),
            });
        }

        let result = match outcome {
            Ok(result) => Arc::new(result),
            Err(e) => {
                warn!("Aggregation failed for {}: {}", ticket.path, e);
                return Err(e);
            }
        };

        let traversal = self.active_mut(operation)?;
        traversal.last_result = Some(result.clone());
        self.applied_seq = ticket.seq;

        debug!(
            "Applied result for {}: {} of {} groups{}",
            ticket.path,
            result.len(),
            result.total_groups,
            if result.truncated { " (truncated)" } else { "" }
        );
        Ok(result)
    }

    /// Compute the result of the current path
    pub async fn current_result(&mut self) -> Result<Arc<AggregationResult>> {
        let ticket = self.begin_query()?;
        let outcome = ticket.execute().await;
        self.complete_query(&ticket, outcome)
    }

    /// Release the dataset. Further operations fail with an invalid state error.
    pub fn close(&mut self) -> Result<()> {
        let phase = std::mem::replace(&mut self.phase, Phase::Closed);
        self.advance_generation();
        if let Phase::Active(traversal) = phase {
            traversal.source.handle.close()?;
            info!("Closed session on '{}'", traversal.source.connector.source_name());
        }
        Ok(())
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.active(Operation::CurrentResult).ok().map(|t| &t.current)
    }

    /// Ancestors of the current path, oldest first
    pub fn history(&self) -> &[Path] {
        match &self.phase {
            Phase::Active(traversal) => &traversal.history,
            _ => &[],
        }
    }

    pub fn depth(&self) -> usize {
        self.history().len()
    }

    pub fn schema(&self) -> Option<Arc<DatasetSchema>> {
        self.active(Operation::CurrentResult).ok().map(|t| t.source.schema.clone())
    }

    /// Result of the current path, if computed since the last navigation
    pub fn last_result(&self) -> Option<Arc<AggregationResult>> {
        self.active(Operation::CurrentResult).ok().and_then(|t| t.last_result.clone())
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.active(Operation::CurrentResult).ok().map(|t| t.source.row_limit)
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.active(Operation::CurrentResult).ok().map(|t| t.source.backend.name())
    }

    /// Filter trail of the current path, labelled for display
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let Ok(traversal) = self.active(Operation::CurrentResult) else {
            return Vec::new();
        };
        traversal
            .current
            .filters
            .iter()
            .map(|filter| Breadcrumb {
                dimension: filter.dimension.clone(),
                label: traversal
                    .source
                    .schema
                    .dimension(&filter.dimension)
                    .map(|d| d.label.clone())
                    .unwrap_or_else(|| filter.dimension.clone()),
                value: filter.value.clone(),
            })
            .collect()
    }

    pub fn context(&self) -> TraversalContext {
        TraversalContext {
            state: self.state(),
            path: self.current_path().cloned(),
            breadcrumbs: self.breadcrumbs(),
            dimensions: self.schema().map(|s| s.dimension_names()).unwrap_or_default(),
            measures: self.schema().map(|s| s.measure_names()).unwrap_or_default(),
        }
    }
}

impl Drop for TraversalSession {
    fn drop(&mut self) {
        for task in self.in_flight.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::RowLimitPolicy;
    use crate::path::{AggFn, Filter};
    use crate::testing::{sales_connector, BrokenBackend, UnreachableConnector};
    use crate::traversal::Advice;

    fn sum_sales_by(group_by: &str) -> PathSeed {
        PathSeed::new(group_by, Some("sales"), AggFn::Sum)
    }

    async fn loaded() -> TraversalSession {
        let mut session = TraversalSession::new(Arc::new(EngineConfig::default()));
        session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), sum_sales_by("region"))
            .await
            .unwrap();
        session
    }

    fn keys(result: &AggregationResult) -> Vec<&str> {
        result.keys().collect()
    }

    #[tokio::test]
    async fn test_load_roots_session() {
        let session = loaded().await;

        assert_eq!(session.state(), TraversalState::Rooted);
        let path = session.current_path().unwrap();
        assert!(path.is_root());
        assert_eq!(path.group_by.as_deref(), Some("region"));
        assert!(session.history().is_empty());
        assert_eq!(session.row_limit(), Some(500));
        assert_eq!(session.backend_name(), Some("memory"));
    }

    #[tokio::test]
    async fn test_load_defaults_to_first_dimension() {
        let mut session = TraversalSession::new(Arc::new(EngineConfig::default()));
        let root = session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), PathSeed::default())
            .await
            .unwrap();

        assert_eq!(root.group_by.as_deref(), Some("region"));
        assert_eq!(root.agg_fn, AggFn::Count);
        let result = session.current_result().await.unwrap();
        assert_eq!(result.value_of("West"), Some(4.0));
        assert_eq!(result.value_of("East"), Some(3.0));
    }

    #[tokio::test]
    async fn test_load_twice_is_rejected() {
        let mut session = loaded().await;
        let err = session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), sum_sales_by("region"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { operation: Operation::Load, .. }));
        assert_eq!(session.state(), TraversalState::Rooted);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_session_empty() {
        let mut session = TraversalSession::new(Arc::new(EngineConfig::default()));

        let err = session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), sum_sales_by("country"))
            .await
            .unwrap_err();
        match err {
            EngineError::SchemaMismatch { missing, .. } => assert_eq!(missing, vec!["country"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.state(), TraversalState::Empty);

        let err = session
            .load(Arc::new(UnreachableConnector), Arc::new(MemoryBackend::new()), PathSeed::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Connection { .. }));
        assert_eq!(session.state(), TraversalState::Empty);

        let missing_measure = PathSeed::new("region", None, AggFn::Avg);
        let err = session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), missing_measure)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingMeasure { .. }));

        // Still loadable afterwards
        session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), sum_sales_by("region"))
            .await
            .unwrap();
        assert_eq!(session.state(), TraversalState::Rooted);
    }

    #[tokio::test]
    async fn test_drill_detour_back_scenario() {
        let mut session = loaded().await;

        let root = session.current_result().await.unwrap();
        assert_eq!(keys(&root), vec!["West", "East"]);
        assert_eq!(root.value_of("West"), Some(380.0));
        assert_eq!(root.value_of("East"), Some(260.0));

        let drilled = session.drill_into("West", None).unwrap();
        assert_eq!(drilled.filters, vec![Filter::equals("region", "West")]);
        assert_eq!(drilled.group_by.as_deref(), Some("product"));
        assert_eq!(session.state(), TraversalState::Drilled { depth: 1 });

        let by_product = session.current_result().await.unwrap();
        assert_eq!(keys(&by_product), vec!["Desk", "Chair", "Lamp"]);
        assert_eq!(by_product.value_of("Chair"), Some(150.0));

        let detoured = session.detour("quarter").unwrap();
        assert_eq!(detoured.filters, drilled.filters);
        assert_eq!(detoured.group_by.as_deref(), Some("quarter"));
        assert_eq!(session.depth(), 1);

        let by_quarter = session.current_result().await.unwrap();
        assert_eq!(keys(&by_quarter), vec!["Q1", "Q2", "Q3"]);
        // Detour re-slices the same rows
        assert_eq!(by_quarter.grand_total(), by_product.grand_total());
        assert_ne!(by_quarter.grand_total(), root.grand_total());

        let back = session.go_back().unwrap();
        assert!(back.is_root());
        assert_eq!(back.group_by.as_deref(), Some("region"));
        assert_eq!(session.state(), TraversalState::Rooted);
    }

    #[tokio::test]
    async fn test_drill_then_back_restores_path() {
        let mut session = loaded().await;
        session.current_result().await.unwrap();
        let before = session.current_path().cloned().unwrap();

        session.drill_into("East", Some("quarter")).unwrap();
        session.current_result().await.unwrap();
        session.drill_into("Q2", None).unwrap();
        assert_eq!(session.current_path().unwrap().group_by.as_deref(), Some("product"));
        assert_eq!(session.depth(), 2);

        session.go_back().unwrap();
        session.go_back().unwrap();
        assert_eq!(session.current_path(), Some(&before));
        assert_eq!(session.depth(), 0);
    }

    #[tokio::test]
    async fn test_drill_on_unseen_value_fails_without_change() {
        let mut session = loaded().await;

        // Nothing computed yet
        let err = session.drill_into("West", None).unwrap_err();
        assert!(matches!(err, EngineError::DimensionValueNotFound { .. }));

        session.current_result().await.unwrap();
        let before = session.current_path().cloned();
        let err = session.drill_into("North", None).unwrap_err();
        match err {
            EngineError::DimensionValueNotFound { dimension, value, .. } => {
                assert_eq!(dimension, "region");
                assert_eq!(value, "North");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.current_path().cloned(), before);
        assert!(session.last_result().is_some());
    }

    #[tokio::test]
    async fn test_unknown_dimensions_are_rejected() {
        let mut session = loaded().await;
        session.current_result().await.unwrap();

        let err = session.drill_into("West", Some("colour")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownDimension { .. }));
        let err = session.detour("colour").unwrap_err();
        assert!(matches!(err, EngineError::UnknownDimension { .. }));
        assert_eq!(session.state(), TraversalState::Rooted);
        assert!(session.last_result().is_some());
    }

    #[tokio::test]
    async fn test_go_back_at_root() {
        let mut session = loaded().await;
        let err = session.go_back().unwrap_err();
        assert!(matches!(err, EngineError::AtRoot { .. }));
        assert!(err.is_navigation_error());
        assert_eq!(session.state(), TraversalState::Rooted);
    }

    #[tokio::test]
    async fn test_leaf_path_has_nothing_to_filter() {
        let mut session = TraversalSession::new(Arc::new(EngineConfig::default()));
        let seed = sum_sales_by("region").with_drill_order(["region"]);
        session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), seed)
            .await
            .unwrap();
        session.current_result().await.unwrap();

        let leaf = session.drill_into("West", None).unwrap();
        assert_eq!(leaf.group_by, None);

        let total = session.current_result().await.unwrap();
        assert_eq!(total.len(), 1);
        assert_eq!(total.grand_total(), 380.0);

        let err = session.drill_into("(all)", None).unwrap_err();
        assert!(matches!(err, EngineError::NoDimensionToFilter { .. }));
    }

    #[tokio::test]
    async fn test_drill_order_from_advice() {
        let mut session = TraversalSession::new(Arc::new(EngineConfig::default()));
        let advice = Advice {
            suggested_path: Some(Path::root(Some("product".into()), Some("sales".into()), AggFn::Max)),
            ranked_dimensions: vec!["product".into(), "colour".into(), "quarter".into()],
        };
        session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), PathSeed::from_advice(&advice))
            .await
            .unwrap();

        let result = session.current_result().await.unwrap();
        assert_eq!(keys(&result), vec!["Desk", "Chair", "Lamp"]);
        assert_eq!(result.value_of("Desk"), Some(200.0));

        let drilled = session.drill_into("Desk", None).unwrap();
        assert_eq!(drilled.group_by.as_deref(), Some("quarter"));
    }

    #[tokio::test]
    async fn test_navigation_supersedes_pending_query() {
        let mut session = loaded().await;

        let ticket = session.begin_query().unwrap();
        let outcome = ticket.execute().await;
        session.detour("product").unwrap();

        let err = session.complete_query(&ticket, outcome).unwrap_err();
        assert!(matches!(err, EngineError::Superseded { .. }));
        assert!(session.last_result().is_none());
    }

    #[tokio::test]
    async fn test_older_query_never_overwrites_newer() {
        let mut session = loaded().await;

        let older = session.begin_query().unwrap();
        let newer = session.begin_query().unwrap();
        let newer_outcome = newer.execute().await;
        session.complete_query(&newer, newer_outcome).unwrap();

        let older_outcome = older.execute().await;
        let err = session.complete_query(&older, older_outcome).unwrap_err();
        assert!(matches!(err, EngineError::Superseded { .. }));
        assert!(session.last_result().is_some());
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_path() {
        let mut session = TraversalSession::new(Arc::new(EngineConfig::default()));
        session
            .load(sales_connector(), Arc::new(BrokenBackend), sum_sales_by("region"))
            .await
            .unwrap();

        let err = session.current_result().await.unwrap_err();
        assert!(matches!(err, EngineError::Backend { .. }));
        assert_eq!(session.state(), TraversalState::Rooted);
        assert!(session.last_result().is_none());
    }

    #[tokio::test]
    async fn test_results_are_deterministic() {
        let mut session = loaded().await;
        let first = session.current_result().await.unwrap();
        let second = session.current_result().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_row_limit_truncates() {
        let config = EngineConfig {
            row_limit: RowLimitPolicy {
                default_limit: 2,
                ..RowLimitPolicy::default()
            },
            ..EngineConfig::default()
        };
        let mut session = TraversalSession::new(Arc::new(config));
        session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), sum_sales_by("product"))
            .await
            .unwrap();

        let result = session.current_result().await.unwrap();
        assert_eq!(keys(&result), vec!["Desk", "Chair"]);
        assert_eq!(result.total_groups, 3);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_zero_row_limit_keeps_top_group() {
        let config = EngineConfig {
            row_limit: RowLimitPolicy {
                default_limit: 0,
                ..RowLimitPolicy::default()
            },
            ..EngineConfig::default()
        };
        let mut session = TraversalSession::new(Arc::new(config));
        session
            .load(sales_connector(), Arc::new(MemoryBackend::new()), sum_sales_by("product"))
            .await
            .unwrap();

        assert_eq!(session.row_limit(), Some(1));
        let result = session.current_result().await.unwrap();
        assert_eq!(keys(&result), vec!["Desk"]);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_breadcrumbs_and_context() {
        let mut session = loaded().await;
        session.current_result().await.unwrap();
        session.drill_into("West", None).unwrap();

        let crumbs = session.breadcrumbs();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].dimension, "region");
        assert_eq!(crumbs[0].label, "Region");

        let context = session.context();
        assert_eq!(context.state, TraversalState::Drilled { depth: 1 });
        assert_eq!(context.dimensions, vec!["region", "product", "quarter"]);
        assert_eq!(context.measures, vec!["sales"]);
    }

    #[tokio::test]
    async fn test_close_rejects_further_operations() {
        let mut session = loaded().await;
        session.close().unwrap();

        assert_eq!(session.state(), TraversalState::Closed);
        assert!(matches!(session.go_back(), Err(EngineError::InvalidState { .. })));
        assert!(matches!(session.current_result().await, Err(EngineError::InvalidState { .. })));
        assert!(session.context().path.is_none());
        session.close().unwrap();
    }
}
