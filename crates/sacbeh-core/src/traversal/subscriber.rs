//! Traversal subscriber trait

use super::TraversalContext;
use uuid::Uuid;

/// Trait for components that need to respond to path changes
pub trait TraversalSubscriber: Send + Sync {
    /// Called after a session's current path changed
    fn on_traversal_change(&self, session: Uuid, context: &TraversalContext);
}
