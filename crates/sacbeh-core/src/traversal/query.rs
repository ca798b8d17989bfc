//! In-flight aggregation requests

use std::sync::Arc;

use crate::backend::{AggregateRequest, AggregationBackend};
use crate::connector::SourceHandle;
use crate::error::Result;
use crate::path::Path;
use crate::result::AggregationResult;

/// A snapshot of everything needed to compute the current path's result.
///
/// Tickets are executed without holding the session, then handed back to
/// [`super::TraversalSession::complete_query`], which discards them when the
/// session has navigated away in the meantime.
#[derive(Clone)]
pub struct QueryTicket {
    pub(crate) seq: u64,
    pub(crate) generation: u64,
    pub(crate) path: Path,
    pub(crate) request: AggregateRequest,
    pub(crate) handle: Arc<dyn SourceHandle>,
    pub(crate) backend: Arc<dyn AggregationBackend>,
}

impl QueryTicket {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn request(&self) -> &AggregateRequest {
        &self.request
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Request sequence number within the session
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub async fn execute(&self) -> Result<AggregationResult> {
        tracing::debug!(
            "Executing {} on '{}' via {}",
            self.request,
            self.handle.source_name(),
            self.backend.name()
        );
        self.backend.aggregate(self.handle.clone(), &self.request).await
    }
}

impl std::fmt::Debug for QueryTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTicket")
            .field("seq", &self.seq)
            .field("generation", &self.generation)
            .field("path", &self.path.to_string())
            .field("backend", &self.backend.name())
            .finish()
    }
}
