//! Entry point for callers and the rendering layer
//!
//! The facade owns every live [`TraversalSession`], routes operations by
//! session id and notifies subscribers after each successful navigation.
//! Sessions are independent: each one sits behind its own lock, so a slow
//! aggregation in one session never blocks another.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::AggregationBackend;
use crate::chart::to_chart_spec;
use crate::config::{EngineConfig, SourceConfig};
use crate::connector::SourceConnector;
use crate::error::{EngineError, Operation, Result};
use crate::path::Path;
use crate::registry::ComponentRegistry;
use crate::result::AggregationResult;
use crate::schema::DatasetSchema;
use crate::traversal::{PathSeed, TraversalContext, TraversalSession, TraversalSubscriber};

pub type SessionId = Uuid;

/// Interaction reported by the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderEvent {
    /// A bar or point was clicked
    ValueClicked {
        value: String,
        #[serde(default)]
        next_dimension: Option<String>,
    },
    /// Another grouping dimension was picked
    DimensionSelected { dimension: String },
    BackRequested,
}

/// Summary of the facade and its registered components
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacadeInfo {
    pub name: String,
    pub version: String,
    pub sessions: usize,
    pub default_backend: String,
    pub connectors: Vec<String>,
    pub backends: Vec<String>,
}

type SharedSession = Arc<Mutex<TraversalSession>>;

pub struct NavigationFacade {
    registry: Arc<ComponentRegistry>,
    config: Arc<EngineConfig>,
    sessions: RwLock<AHashMap<SessionId, SharedSession>>,
    subscribers: RwLock<Vec<Weak<dyn TraversalSubscriber>>>,
}

impl NavigationFacade {
    pub fn new(registry: Arc<ComponentRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            sessions: RwLock::new(AHashMap::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Start an empty session
    pub fn create_session(&self) -> SessionId {
        let id = Uuid::new_v4();
        let session = TraversalSession::new(self.config.clone());
        self.sessions.write().insert(id, Arc::new(Mutex::new(session)));
        debug!("Created session {}", id);
        id
    }

    fn session(&self, id: SessionId) -> Result<SharedSession> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(id))
    }

    fn resolve(&self, source: &SourceConfig) -> Result<(Arc<dyn SourceConnector>, Arc<dyn AggregationBackend>)> {
        let connector = self.registry.create_connector(source)?;
        let tag = source.backend.as_deref().unwrap_or(&self.config.default_backend);
        let backend = self.registry.create_backend(tag, &self.config)?;
        Ok((connector, backend))
    }

    /// Load a source described by configuration into an empty session
    pub async fn load(&self, id: SessionId, source: &SourceConfig, seed: PathSeed) -> Result<Path> {
        let (connector, backend) = self.resolve(source)?;
        self.load_with(id, connector, backend, seed).await
    }

    /// Load with an already constructed connector and backend
    pub async fn load_with(
        &self,
        id: SessionId,
        connector: Arc<dyn SourceConnector>,
        backend: Arc<dyn AggregationBackend>,
        seed: PathSeed,
    ) -> Result<Path> {
        let session = self.session(id)?;
        let mut session = session.lock().await;
        let root = session.load(connector, backend, seed).await?;
        self.notify(id, &session.context());
        Ok(root)
    }

    /// Tear down the session's dataset and load another one in its place.
    ///
    /// The previous traversal is discarded even when the new load fails; the
    /// session is then left empty.
    pub async fn switch_dataset(&self, id: SessionId, source: &SourceConfig, seed: PathSeed) -> Result<Path> {
        let (connector, backend) = self.resolve(source)?;
        let session = self.session(id)?;
        let mut session = session.lock().await;

        if let Err(e) = session.close() {
            warn!("Failed to release previous dataset of session {}: {}", id, e);
        }
        *session = TraversalSession::new(self.config.clone());
        info!("Switching session {} to '{}'", id, connector.source_name());

        let loaded = session.load(connector, backend, seed).await;
        self.notify(id, &session.context());
        loaded
    }

    pub async fn drill_into(&self, id: SessionId, value: &str, next_dimension: Option<&str>) -> Result<Path> {
        let session = self.session(id)?;
        let mut session = session.lock().await;
        let path = session.drill_into(value, next_dimension)?;
        self.notify(id, &session.context());
        Ok(path)
    }

    pub async fn detour(&self, id: SessionId, dimension: &str) -> Result<Path> {
        let session = self.session(id)?;
        let mut session = session.lock().await;
        let path = session.detour(dimension)?;
        self.notify(id, &session.context());
        Ok(path)
    }

    pub async fn go_back(&self, id: SessionId) -> Result<Path> {
        let session = self.session(id)?;
        let mut session = session.lock().await;
        let path = session.go_back()?;
        self.notify(id, &session.context());
        Ok(path)
    }

    /// Translate a rendering event into the matching navigation
    pub async fn dispatch(&self, id: SessionId, event: RenderEvent) -> Result<Path> {
        debug!("Session {} received {:?}", id, event);
        match event {
            RenderEvent::ValueClicked { value, next_dimension } => {
                self.drill_into(id, &value, next_dimension.as_deref()).await
            }
            RenderEvent::DimensionSelected { dimension } => self.detour(id, &dimension).await,
            RenderEvent::BackRequested => self.go_back(id).await,
        }
    }

    /// Compute the result of the session's current path.
    ///
    /// The session is only locked to issue and to apply the query. A navigation
    /// in between cancels the computation and this call fails as superseded.
    pub async fn current_result(&self, id: SessionId) -> Result<Arc<AggregationResult>> {
        let (_, _, result) = self.compute(id).await?;
        Ok(result)
    }

    /// Chart spec for the session's current path
    pub async fn current_view(&self, id: SessionId) -> Result<serde_json::Value> {
        let (path, schema, result) = self.compute(id).await?;
        to_chart_spec(&path, &result, &schema)
    }

    async fn compute(&self, id: SessionId) -> Result<(Path, Arc<DatasetSchema>, Arc<AggregationResult>)> {
        let session = self.session(id)?;

        let (ticket, task) = {
            let mut guard = session.lock().await;
            let ticket = guard.begin_query()?;
            let runner = ticket.clone();
            let task = tokio::spawn(async move { runner.execute().await });
            guard.track_in_flight(task.abort_handle());
            (ticket, task)
        };

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                debug!("Query {} of session {} was cancelled", ticket.seq(), id);
                return Err(EngineError::Superseded {
                    operation: Operation::CurrentResult,
                    path: ticket.path().to_string(),
                });
            }
            Err(e) => Err(ticket.request().failure(ticket.backend_name(), e.to_string())),
        };

        let mut guard = session.lock().await;
        let result = guard.complete_query(&ticket, outcome)?;
        let schema = guard.schema().ok_or_else(|| EngineError::InvalidState {
            operation: Operation::CurrentResult,
            state: guard.state().to_string(),
        })?;
        Ok((ticket.path().clone(), schema, result))
    }

    pub async fn context(&self, id: SessionId) -> Result<TraversalContext> {
        let session = self.session(id)?;
        let context = session.lock().await.context();
        Ok(context)
    }

    /// Close and forget a session
    pub async fn close_session(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(EngineError::SessionNotFound(id))?;
        let mut session = session.lock().await;
        session.close()?;
        self.notify(id, &session.context());
        debug!("Closed session {}", id);
        Ok(())
    }

    /// Close every session
    pub async fn shutdown(&self) {
        let sessions: Vec<(SessionId, SharedSession)> = self.sessions.write().drain().collect();
        info!("Shutting down {} sessions", sessions.len());
        for (id, session) in sessions {
            if let Err(e) = session.lock().await.close() {
                warn!("Failed to close session {}: {}", id, e);
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn info(&self) -> FacadeInfo {
        FacadeInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions: self.session_count(),
            default_backend: self.config.default_backend.clone(),
            connectors: self.registry.supported_connectors(),
            backends: self.registry.supported_backends(),
        }
    }

    /// Add a subscriber. Only a weak reference is kept.
    pub fn add_subscriber(&self, subscriber: Arc<dyn TraversalSubscriber>) {
        let mut subscribers = self.subscribers.write();
        subscribers.push(Arc::downgrade(&subscriber));
    }

    fn notify(&self, id: SessionId, context: &TraversalContext) {
        let live: Vec<Arc<dyn TraversalSubscriber>> = {
            let mut subscribers = self.subscribers.write();

            // Remove any dead weak references
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        // Called without the lock so subscribers may register others
        for subscriber in live {
            subscriber.on_traversal_change(id, context);
        }
    }
}
