// Path: crates/node/src/node.rs

//! Node assembly.
//!
//! Wires the stores, the chain oracle, the swarm and the workers together:
//! the refresh worker, the stats aggregator, the sync engine, the ingress
//! dispatcher and the network bridge that turns swarm events into pipeline
//! work and answers peer fetches.

use crate::context::{now_ms, NodeContext};
use crate::fanout::FanoutRegistry;
use crate::ingress::{self, IngressSender};
use crate::oracle::{spawn_refresh_worker, ChainCache, ChainClient};
use crate::stats::spawn_stats_worker;
use crate::sync::spawn_sync_worker;
use mlayer_crypto::sign::ed25519::Ed25519KeyPair;
use mlayer_networking::libp2p::{
    EventGossip, NetworkEvent, P2pAction, P2pPayload, P2pResponse, StateQuery, SwarmCommand,
};
use mlayer_networking::traits::EventPublisher;
use mlayer_storage::{StoreName, Stores};
use mlayer_types::codec;
use mlayer_types::config::NodeConfig;
use mlayer_types::entities::{ClientPayload, Event, EventPath, StateHead};
use mlayer_types::error::AppError;
use mlayer_types::keys;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A running node.
pub struct Node {
    /// The shared context (also the programmatic ingress point for the
    /// RPC/WS surfaces).
    pub context: Arc<NodeContext>,
    gossip: Arc<EventGossip>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Node {
    /// Boots the node: opens stores, performs the first chain refresh,
    /// starts the swarm and spawns every worker.
    pub async fn start(
        config: NodeConfig,
        chain_client: Arc<dyn ChainClient>,
    ) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let keypair = if config.private_key_edd.is_empty() {
            Ed25519KeyPair::generate()
        } else {
            Ed25519KeyPair::from_hex(&config.private_key_edd)?
        };

        let stores = Stores::open(config.store_dir().join("node.redb"))?;
        let chain = Arc::new(ChainCache::new());
        // The first refresh is load-bearing: without the validator set no
        // event can be admitted.
        chain.refresh(chain_client.as_ref(), Some(&stores)).await?;

        let listen_addr = config.listen_addr.parse()?;
        let dial_addrs = config
            .dial_addrs
            .iter()
            .map(|a| a.parse())
            .collect::<Result<Vec<_>, _>>()?;
        let (gossip, swarm_sender, network_events) = EventGossip::new(
            keypair.seed(),
            listen_addr,
            &dial_addrs,
            config.peer_request_timeout,
        )?;

        let (counter_tx, counter_rx) = mpsc::channel(4096);
        let (sync_tx, sync_rx) = mpsc::channel(1024);
        let (ingress_tx, ingress_rx) = mpsc::channel(config.ingress_capacity);

        let context = Arc::new(NodeContext {
            config: config.clone(),
            stores: stores.clone(),
            chain: chain.clone(),
            keypair,
            swarm: swarm_sender,
            counters: counter_tx,
            fanout: Arc::new(FanoutRegistry::default()),
            ingress: IngressSender::new(ingress_tx),
            sync_jobs: sync_tx,
            connected_peers: gossip.connected_peers(),
        });

        let (shutdown, _) = watch::channel(false);
        let handles = vec![
            spawn_refresh_worker(
                chain,
                chain_client,
                stores.clone(),
                config,
                shutdown.subscribe(),
            ),
            spawn_stats_worker(stores, counter_rx, shutdown.subscribe()),
            spawn_sync_worker(context.clone(), sync_rx, shutdown.subscribe()),
            ingress::spawn_dispatcher(context.clone(), ingress_rx, shutdown.subscribe()),
            spawn_network_bridge(context.clone(), network_events, shutdown.subscribe()),
        ];

        tracing::info!(
            target: "node",
            validator = %context.public_key_hex(),
            peer_id = %gossip.local_peer_id(),
            "node started"
        );

        Ok(Self {
            context,
            gossip,
            shutdown,
            handles,
        })
    }

    /// Accepts a signed client payload: wraps it into an event and queues
    /// it on ingress. This is what the RPC/WS surfaces call.
    pub async fn submit(&self, payload: ClientPayload) -> Result<Event, AppError> {
        let event = self.context.create_event(payload, now_ms())?;
        if !self.context.ingress.submit_local(event.clone()).await {
            return Err(AppError::Internal("ingress channel closed".into()));
        }
        Ok(event)
    }

    /// Stops every worker, drains ingress and tears the swarm down.
    pub async fn stop(self) {
        self.shutdown.send(true).ok();
        for handle in self.handles {
            handle.await.ok();
        }
        self.gossip.stop().await.ok();
    }
}

/// Turns swarm events into pipeline work and serves peer fetches.
fn spawn_network_bridge(
    ctx: Arc<NodeContext>,
    mut events: mpsc::Receiver<NetworkEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => if *shutdown.borrow() { break; },
                event = events.recv() => match event {
                    Some(NetworkEvent::GossipEvent { model, event }) => {
                        if event.model() != model {
                            tracing::warn!(target: "network", event = %event.id, "event arrived on the wrong topic; dropped");
                            continue;
                        }
                        if !ctx.ingress.submit_peer(*event) {
                            ingress::count_dropped(&ctx);
                        }
                    }
                    Some(NetworkEvent::InboundRequest { peer, request, channel }) => {
                        let response = serve_request(&ctx, &request);
                        tracing::debug!(target: "network", %peer, action = ?request.action, "served peer request");
                        ctx.swarm.send(SwarmCommand::SendResponse { channel, response }).await.ok();
                    }
                    Some(NetworkEvent::ConnectionEstablished(peer)) => {
                        tracing::info!(target: "network", %peer, "peer connected");
                    }
                    Some(NetworkEvent::ConnectionClosed(peer)) => {
                        tracing::info!(target: "network", %peer, "peer disconnected");
                    }
                    Some(NetworkEvent::OutboundFailure(_)) => {}
                    None => break,
                }
            }
        }
    })
}

/// Answers one verified point-to-point request from local stores.
pub fn serve_request(ctx: &NodeContext, request: &P2pPayload) -> P2pResponse {
    match request.action {
        P2pAction::GetEvent => serve_event(ctx, request),
        P2pAction::GetState => serve_state(ctx, request),
        P2pAction::GetCert => {
            let mut response = P2pResponse::empty(P2pAction::GetCert);
            if let Ok(Some(cert)) = ctx.stores.get(StoreName::ChainCache, "/cert") {
                response.event = cert;
            }
            response
        }
        P2pAction::PublishEvent => {
            if let Ok(event) = codec::from_bytes_canonical::<Event>(&request.payload) {
                if !ctx.ingress.submit_peer(event) {
                    ingress::count_dropped(ctx);
                }
            }
            P2pResponse::empty(P2pAction::PublishEvent)
        }
    }
}

fn serve_event(ctx: &NodeContext, request: &P2pPayload) -> P2pResponse {
    let mut response = P2pResponse::empty(P2pAction::GetEvent);
    let Ok(path) = codec::from_bytes_canonical::<EventPath>(&request.payload) else {
        return response;
    };
    let Ok(Some(event_bytes)) = ctx.stores.get(StoreName::Events, &keys::event_key(&path.id))
    else {
        return response;
    };
    // Ship the entity's current state along with the event so the caller
    // can resolve both in one round trip.
    if let Ok(event) = codec::from_bytes_canonical::<Event>(&event_bytes) {
        if let Ok(entity_id) = event.payload.data.entity_id() {
            if let Ok(Some(state)) = ctx.stores.get(
                StoreName::CurrentState,
                &keys::current_state_key(event.model(), &entity_id),
            ) {
                response.states.push(serde_bytes::ByteBuf::from(state));
            }
        }
    }
    response.event = event_bytes;
    response
}

fn serve_state(ctx: &NodeContext, request: &P2pPayload) -> P2pResponse {
    let mut response = P2pResponse::empty(P2pAction::GetState);
    let Ok(query) = codec::from_bytes_canonical::<StateQuery>(&request.payload) else {
        return response;
    };
    let Ok(Some(state_bytes)) = ctx.stores.get(
        StoreName::CurrentState,
        &keys::current_state_key(query.model, &query.id),
    ) else {
        return response;
    };
    if let Ok(head) = codec::from_bytes_canonical::<StateHead>(&state_bytes) {
        if let Some(path) = head.event {
            if let Ok(Some(event_bytes)) =
                ctx.stores.get(StoreName::Events, &keys::event_key(&path.id))
            {
                response.event = event_bytes;
            }
        }
    }
    response.states.push(serde_bytes::ByteBuf::from(state_bytes));
    response
}
