// Path: crates/networking/src/libp2p/mod.rs

//! The libp2p-based implementation of the event fabric.

pub mod protocol;

pub use protocol::{DataCodec, P2pAction, P2pPayload, P2pResponse, StateQuery};

use crate::traits::{EventPublisher, NodeState};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    gossipsub, identity, noise,
    request_response::{self, ResponseChannel},
    swarm::SwarmEvent,
    tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use mlayer_types::codec;
use mlayer_types::entities::{EntityModel, Event};
use mlayer_types::error::NetworkError;
use std::{
    collections::{HashMap, HashSet},
    iter,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
};

/// The request/response protocol label.
pub const PROTOCOL_LABEL: &str = "/mlayer/1.0.0";

// --- Core network behaviour and event/command types ---

#[derive(libp2p::swarm::NetworkBehaviour)]
#[behaviour(to_swarm = "DataBehaviourEvent")]
pub struct DataBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub request_response: request_response::Behaviour<DataCodec>,
}

#[derive(Debug)]
pub enum DataBehaviourEvent {
    Gossipsub(gossipsub::Event),
    RequestResponse(request_response::Event<P2pPayload, P2pResponse>),
}

impl From<gossipsub::Event> for DataBehaviourEvent {
    fn from(event: gossipsub::Event) -> Self {
        DataBehaviourEvent::Gossipsub(event)
    }
}

impl From<request_response::Event<P2pPayload, P2pResponse>> for DataBehaviourEvent {
    fn from(event: request_response::Event<P2pPayload, P2pResponse>) -> Self {
        DataBehaviourEvent::RequestResponse(event)
    }
}

/// Commands accepted by the swarm loop.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Listen on an address.
    Listen(Multiaddr),
    /// Dial a bootstrap peer.
    Dial(Multiaddr),
    /// Publish canonical event bytes to a model's gossip topic.
    PublishEvent {
        /// The entity model whose topic carries the event.
        model: EntityModel,
        /// Canonical event bytes.
        data: Vec<u8>,
    },
    /// Send a signed point-to-point request; the reply resolves with the
    /// peer's response or the outbound failure.
    SendRequest {
        /// Target peer.
        peer: PeerId,
        /// The signed frame.
        request: P2pPayload,
        /// Resolved when the response (or failure) arrives.
        reply: oneshot::Sender<Result<P2pResponse, NetworkError>>,
    },
    /// Answer an inbound request.
    SendResponse {
        /// The response channel handed out with the request.
        channel: ResponseChannel<P2pResponse>,
        /// The response frame.
        response: P2pResponse,
    },
}

/// Events surfaced to the node.
#[derive(Debug)]
pub enum NetworkEvent {
    /// A peer connected.
    ConnectionEstablished(PeerId),
    /// A peer disconnected.
    ConnectionClosed(PeerId),
    /// A gossiped event arrived on a model topic.
    GossipEvent {
        /// The topic's entity model.
        model: EntityModel,
        /// The decoded event.
        event: Box<Event>,
    },
    /// An inbound point-to-point request (already signature-verified).
    InboundRequest {
        /// The requesting peer.
        peer: PeerId,
        /// The verified frame.
        request: P2pPayload,
        /// Channel to answer on.
        channel: ResponseChannel<P2pResponse>,
    },
    /// An outbound request to a peer failed or timed out.
    OutboundFailure(PeerId),
}

// --- EventGossip implementation ---

/// Handle to the running swarm: command sender plus liveness bookkeeping.
pub struct EventGossip {
    swarm_command_sender: mpsc::Sender<SwarmCommand>,
    shutdown_sender: Arc<watch::Sender<bool>>,
    task_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    node_state: Arc<Mutex<NodeState>>,
    connected_peers: Arc<Mutex<HashSet<PeerId>>>,
    local_peer_id: PeerId,
}

impl EventGossip {
    /// Builds the swarm from the node's Ed25519 seed and spawns its loop.
    pub fn new(
        ed25519_seed: [u8; 32],
        listen_addr: Multiaddr,
        dial_addrs: &[Multiaddr],
        request_timeout: Duration,
    ) -> anyhow::Result<(
        Arc<Self>,
        mpsc::Sender<SwarmCommand>,
        mpsc::Receiver<NetworkEvent>,
    )> {
        let mut seed = ed25519_seed;
        let local_key = identity::Keypair::ed25519_from_bytes(&mut seed)?;
        let local_peer_id = local_key.public().to_peer_id();

        let (shutdown_sender, _) = watch::channel(false);
        let (swarm_command_sender, swarm_command_receiver) = mpsc::channel(256);
        let (network_event_sender, network_event_receiver) = mpsc::channel(256);

        let node_state = Arc::new(Mutex::new(NodeState::Initializing));
        let connected_peers = Arc::new(Mutex::new(HashSet::new()));

        let swarm = Self::build_swarm(local_key, request_timeout)?;
        let peers_for_loop = connected_peers.clone();
        let swarm_task = tokio::spawn(Self::run_swarm_loop(
            swarm,
            swarm_command_receiver,
            network_event_sender,
            shutdown_sender.subscribe(),
            peers_for_loop,
        ));

        let initial_cmds_task = tokio::spawn({
            let cmd_sender = swarm_command_sender.clone();
            let listen = listen_addr.clone();
            let dials = dial_addrs.to_vec();
            async move {
                cmd_sender.send(SwarmCommand::Listen(listen)).await.ok();
                for addr in dials {
                    cmd_sender.send(SwarmCommand::Dial(addr)).await.ok();
                }
            }
        });

        let gossip = Arc::new(Self {
            swarm_command_sender: swarm_command_sender.clone(),
            shutdown_sender: Arc::new(shutdown_sender),
            task_handles: Arc::new(Mutex::new(vec![swarm_task, initial_cmds_task])),
            node_state,
            connected_peers,
            local_peer_id,
        });

        Ok((gossip, swarm_command_sender, network_event_receiver))
    }

    /// Our libp2p peer id.
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// The currently connected peers.
    pub fn connected_peers(&self) -> Arc<Mutex<HashSet<PeerId>>> {
        self.connected_peers.clone()
    }

    /// Shared node liveness state.
    pub fn node_state(&self) -> Arc<Mutex<NodeState>> {
        self.node_state.clone()
    }

    fn build_swarm(
        local_key: identity::Keypair,
        request_timeout: Duration,
    ) -> anyhow::Result<Swarm<DataBehaviour>> {
        let swarm = SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key| {
                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub::Config::default(),
                )?;
                let cfg =
                    request_response::Config::default().with_request_timeout(request_timeout);
                let request_response = request_response::Behaviour::new(
                    iter::once((PROTOCOL_LABEL, request_response::ProtocolSupport::Full)),
                    cfg,
                );
                Ok(DataBehaviour {
                    gossipsub,
                    request_response,
                })
            })?
            .build();
        Ok(swarm)
    }

    async fn run_swarm_loop(
        mut swarm: Swarm<DataBehaviour>,
        mut command_receiver: mpsc::Receiver<SwarmCommand>,
        event_sender: mpsc::Sender<NetworkEvent>,
        mut shutdown_receiver: watch::Receiver<bool>,
        connected_peers: Arc<Mutex<HashSet<PeerId>>>,
    ) {
        // Outstanding point-to-point requests awaiting their responses.
        let mut pending: HashMap<
            request_response::OutboundRequestId,
            oneshot::Sender<Result<P2pResponse, NetworkError>>,
        > = HashMap::new();

        // One gossip topic per entity model; every node subscribes to all.
        let topics: Vec<(EntityModel, gossipsub::IdentTopic)> = EntityModel::ALL
            .iter()
            .map(|m| (*m, gossipsub::IdentTopic::new(m.pubsub_topic())))
            .collect();
        for (_, topic) in &topics {
            if let Err(e) = swarm.behaviour_mut().gossipsub.subscribe(topic) {
                tracing::warn!(target: "network", topic = %topic, error = %e, "gossip subscribe failed");
            }
        }

        loop {
            tokio::select! {
                _ = shutdown_receiver.changed() => if *shutdown_receiver.borrow() { break; },
                event = swarm.select_next_some() => match event {
                    SwarmEvent::NewListenAddr { address, .. } => {
                        tracing::info!(target: "network", event = "listening", %address);
                    }
                    SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                        connected_peers.lock().await.insert(peer_id);
                        event_sender.send(NetworkEvent::ConnectionEstablished(peer_id)).await.ok();
                    }
                    SwarmEvent::ConnectionClosed { peer_id, .. } => {
                        connected_peers.lock().await.remove(&peer_id);
                        event_sender.send(NetworkEvent::ConnectionClosed(peer_id)).await.ok();
                    }
                    SwarmEvent::Behaviour(DataBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. })) => {
                        let model = topics.iter()
                            .find(|(_, t)| message.topic == t.hash())
                            .map(|(m, _)| *m);
                        let Some(model) = model else { continue };
                        match codec::from_bytes_canonical::<Event>(&message.data) {
                            Ok(event) => {
                                event_sender
                                    .send(NetworkEvent::GossipEvent { model, event: Box::new(event) })
                                    .await
                                    .ok();
                            }
                            Err(e) => {
                                tracing::warn!(target: "gossip", event = "deser_fail", model = %model, error = %e);
                            }
                        }
                    }
                    SwarmEvent::Behaviour(DataBehaviourEvent::RequestResponse(event)) => match event {
                        request_response::Event::Message { peer, message } => match message {
                            request_response::Message::Request { request, channel, .. } => {
                                // Authenticate the frame before it reaches the node.
                                match request.verify() {
                                    Ok(true) => {
                                        event_sender
                                            .send(NetworkEvent::InboundRequest { peer, request, channel })
                                            .await
                                            .ok();
                                    }
                                    _ => {
                                        tracing::warn!(target: "network", %peer, "dropping unsigned or forged request");
                                    }
                                }
                            }
                            request_response::Message::Response { request_id, response } => {
                                if let Some(reply) = pending.remove(&request_id) {
                                    reply.send(Ok(response)).ok();
                                }
                            }
                        },
                        request_response::Event::OutboundFailure { peer, request_id, error } => {
                            tracing::warn!(target: "network", event = "outbound_failure", %peer, ?error);
                            if let Some(reply) = pending.remove(&request_id) {
                                reply.send(Err(NetworkError::RequestFailed(error.to_string()))).ok();
                            }
                            event_sender.send(NetworkEvent::OutboundFailure(peer)).await.ok();
                        }
                        request_response::Event::InboundFailure { peer, error, .. } => {
                            tracing::warn!(target: "network", event = "inbound_failure", %peer, ?error);
                        }
                        _ => {}
                    },
                    _ => {}
                },
                command = command_receiver.recv() => match command {
                    Some(cmd) => match cmd {
                        SwarmCommand::Listen(addr) => { swarm.listen_on(addr).ok(); }
                        SwarmCommand::Dial(addr) => { swarm.dial(addr).ok(); }
                        SwarmCommand::PublishEvent { model, data } => {
                            let topic = topics.iter()
                                .find(|(m, _)| *m == model)
                                .map(|(_, t)| t.clone());
                            if let Some(topic) = topic {
                                if let Err(e) = swarm.behaviour_mut().gossipsub.publish(topic, data) {
                                    tracing::warn!(target: "gossip", model = %model, error = %e, "publish failed");
                                }
                            }
                        }
                        SwarmCommand::SendRequest { peer, request, reply } => {
                            let request_id = swarm.behaviour_mut().request_response.send_request(&peer, request);
                            pending.insert(request_id, reply);
                        }
                        SwarmCommand::SendResponse { channel, response } => {
                            swarm.behaviour_mut().request_response.send_response(channel, response).ok();
                        }
                    },
                    None => return,
                }
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventGossip {
    async fn publish_event(&self, model: EntityModel, event: &Event) -> Result<(), NetworkError> {
        let data = codec::to_bytes_canonical(event)
            .map_err(|e| NetworkError::RequestFailed(e.to_string()))?;
        self.swarm_command_sender
            .send(SwarmCommand::PublishEvent { model, data })
            .await
            .map_err(|e| NetworkError::ChannelClosed(e.to_string()))
    }

    async fn stop(&self) -> Result<(), NetworkError> {
        log::info!("[network] event gossip stopping");
        self.shutdown_sender.send(true).ok();
        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            handle
                .await
                .map_err(|e| NetworkError::ChannelClosed(format!("task panicked: {e}")))?;
        }
        Ok(())
    }
}
