//! Registry mapping type tags to connector and backend constructors

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::backend::{AggregationBackend, MemoryBackend};
use crate::config::{EngineConfig, SourceConfig};
use crate::connector::SourceConnector;
use crate::error::{EngineError, Result};

pub type ConnectorConstructor =
    Arc<dyn Fn(&SourceConfig) -> Result<Arc<dyn SourceConnector>> + Send + Sync>;

pub type BackendConstructor =
    Arc<dyn Fn(&EngineConfig) -> Result<Arc<dyn AggregationBackend>> + Send + Sync>;

/// Read-mostly registry shared by every session
#[derive(Default)]
pub struct ComponentRegistry {
    connectors: RwLock<IndexMap<String, ConnectorConstructor>>,
    backends: RwLock<IndexMap<String, BackendConstructor>>,
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the in-memory backend registered under "memory"
    pub fn with_memory_backend() -> Self {
        let registry = Self::new();
        registry.register_backend("memory", |_| Ok(Arc::new(MemoryBackend::new())));
        registry
    }

    /// Register a connector type, replacing any previous one under `tag`
    pub fn register_connector<F>(&self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&SourceConfig) -> Result<Arc<dyn SourceConnector>> + Send + Sync + 'static,
    {
        let tag = tag.into();
        tracing::debug!("Registering connector '{}'", tag);
        self.connectors.write().insert(tag, Arc::new(constructor));
    }

    /// Register a backend type, replacing any previous one under `tag`
    pub fn register_backend<F>(&self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&EngineConfig) -> Result<Arc<dyn AggregationBackend>> + Send + Sync + 'static,
    {
        let tag = tag.into();
        tracing::debug!("Registering backend '{}'", tag);
        self.backends.write().insert(tag, Arc::new(constructor));
    }

    pub fn create_connector(&self, source: &SourceConfig) -> Result<Arc<dyn SourceConnector>> {
        let constructor = self
            .connectors
            .read()
            .get(&source.kind)
            .cloned()
            .ok_or_else(|| EngineError::UnknownComponent {
                kind: "connector",
                tag: source.kind.clone(),
            })?;
        constructor(source)
    }

    pub fn create_backend(&self, tag: &str, config: &EngineConfig) -> Result<Arc<dyn AggregationBackend>> {
        let constructor = self
            .backends
            .read()
            .get(tag)
            .cloned()
            .ok_or_else(|| EngineError::UnknownComponent {
                kind: "backend",
                tag: tag.to_string(),
            })?;
        constructor(config)
    }

    /// Registered connector tags in registration order
    pub fn supported_connectors(&self) -> Vec<String> {
        self.connectors.read().keys().cloned().collect()
    }

    /// Registered backend tags in registration order
    pub fn supported_backends(&self) -> Vec<String> {
        self.backends.read().keys().cloned().collect()
    }
}
