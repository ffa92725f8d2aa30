// Path: crates/node/src/context.rs

//! The explicit node context handed to every worker.
//!
//! There is no module-level network state: everything a pipeline step or a
//! worker needs — configuration, stores, the chain cache, channel senders —
//! travels in one `NodeContext`, and tests build a synthetic one.

use crate::fanout::FanoutRegistry;
use crate::ingress::IngressSender;
use crate::oracle::ChainCache;
use crate::sync::SyncJob;
use libp2p::PeerId;
use mlayer_crypto::sign::ed25519::Ed25519KeyPair;
use mlayer_networking::libp2p::SwarmCommand;
use mlayer_storage::{StoreName, Stores};
use mlayer_types::config::NodeConfig;
use mlayer_types::entities::{
    Authorization, ClientPayload, EntityData, EntityModel, Event, EventPath, StateHead,
};
use mlayer_types::error::AppError;
use mlayer_types::{codec, keys};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Shared state and channel senders for the node's workers.
pub struct NodeContext {
    /// Node configuration.
    pub config: Arc<NodeConfig>,
    /// The datastore.
    pub stores: Stores,
    /// The chain oracle cache.
    pub chain: Arc<ChainCache>,
    /// The node's Ed25519 identity.
    pub keypair: Ed25519KeyPair,
    /// Commands into the swarm loop.
    pub swarm: mpsc::Sender<SwarmCommand>,
    /// Events queued for the stats aggregator.
    pub counters: mpsc::Sender<Box<Event>>,
    /// Client subscription registry.
    pub fanout: Arc<FanoutRegistry>,
    /// The ingress producer, used to re-feed dependent events.
    pub ingress: IngressSender,
    /// Jobs for the sync engine.
    pub sync_jobs: mpsc::Sender<SyncJob>,
    /// Peers currently connected via gossip.
    pub connected_peers: Arc<Mutex<HashSet<PeerId>>>,
}

impl NodeContext {
    /// Our validator Ed25519 public key, hex.
    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key_hex()
    }

    /// Loads an entity's current-state head, if any.
    pub fn state_head(
        &self,
        model: EntityModel,
        id: &str,
    ) -> Result<Option<StateHead>, AppError> {
        let bytes = self
            .stores
            .get(StoreName::CurrentState, &keys::current_state_key(model, id))?;
        match bytes {
            Some(bytes) => Ok(Some(codec::from_bytes_canonical(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Loads the current authorization state for a grant triple.
    pub fn authorization_state(
        &self,
        account: &str,
        agent: &str,
        subnet: &str,
    ) -> Result<Option<Authorization>, AppError> {
        let probe = Authorization {
            account: account.into(),
            agent: agent.into(),
            subnet: subnet.into(),
            ..Default::default()
        };
        let id = probe.derive_id()?;
        let bytes = self.stores.get(
            StoreName::CurrentState,
            &keys::current_state_key(EntityModel::Authorization, &id),
        )?;
        match bytes {
            Some(bytes) => Ok(Some(codec::from_bytes_canonical(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Wraps a signed client payload into a sealed, signed event, chaining
    /// it to the entity's current state and the authorizing grant.
    pub fn create_event(
        &self,
        payload: ClientPayload,
        timestamp_ms: u64,
    ) -> Result<Event, AppError> {
        let model = payload.data.model();
        let entity_id = payload.data.entity_id()?;

        let previous_event = self
            .state_head(model, &entity_id)?
            .and_then(|head| head.event);

        let auth_event = if payload.agent.is_empty() {
            None
        } else {
            self.authorization_state(&payload.account, &payload.agent, &payload.subnet)?
                .and_then(|auth| auth.event)
                .map(|path| EventPath::new(path.validator, EntityModel::Authorization, path.id))
        };

        let mut event = Event {
            auth_event,
            block_number: self.chain.current_block(),
            broadcasted: false,
            cycle: self.chain.current_cycle(),
            epoch: self.chain.current_epoch(),
            error: String::new(),
            hash: String::new(),
            id: String::new(),
            is_valid: None,
            payload_hash: payload.hash()?,
            event_type: payload.event_type,
            payload,
            previous_event,
            signature: String::new(),
            subnet: String::new(),
            synced: None,
            timestamp: timestamp_ms,
            validator: self.public_key_hex(),
        };
        event.seal()?;
        let signing = event.signing_bytes()?;
        event.signature = self.keypair.sign_hex(&signing);
        Ok(event)
    }
}
