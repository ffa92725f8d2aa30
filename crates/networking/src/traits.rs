// Path: crates/networking/src/traits.rs

//! Traits and shared state for the network layer.

use async_trait::async_trait;
use mlayer_types::entities::{EntityModel, Event};
use mlayer_types::error::NetworkError;

/// The coarse liveness state of this node relative to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Booting; stores open but no peer contact yet.
    Initializing,
    /// Resolving missing dependencies from peers.
    Syncing,
    /// Serving and replicating normally.
    Synced,
}

/// The publish surface the pipeline uses to fan events out.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a finalized event to the gossip topic of its model.
    async fn publish_event(&self, model: EntityModel, event: &Event) -> Result<(), NetworkError>;

    /// Stops the network service and joins its tasks.
    async fn stop(&self) -> Result<(), NetworkError>;
}
