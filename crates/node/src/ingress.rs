// Path: crates/node/src/ingress.rs

//! The single event ingress channel and its dispatcher.
//!
//! Every event enters through one multi-producer channel: locally signed
//! payloads, gossip deliveries and sync results. A single dispatcher task
//! consumes it, which is what guarantees per-entity serial order without
//! per-entity locks. Peer deliveries are shed (and counted) when the channel
//! is full; local producers block instead.

use crate::context::NodeContext;
use crate::pipeline;
use mlayer_storage::StoreName;
use mlayer_types::entities::Event;
use mlayer_types::keys;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Where an event entered the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced by this node from a signed client payload.
    Local,
    /// Delivered by gossip or direct peer publish.
    Peer,
    /// Fetched by the sync engine.
    Sync,
}

/// One unit of ingress work.
#[derive(Debug)]
pub struct IngressEvent {
    /// The event to process.
    pub event: Box<Event>,
    /// Its origin, which steers broadcast and failure semantics.
    pub origin: Origin,
}

/// Producer half of the ingress channel.
#[derive(Clone)]
pub struct IngressSender {
    tx: mpsc::Sender<IngressEvent>,
}

impl IngressSender {
    /// Wraps a channel sender.
    pub fn new(tx: mpsc::Sender<IngressEvent>) -> Self {
        Self { tx }
    }

    /// Submits a locally produced event, blocking while the channel is full.
    pub async fn submit_local(&self, event: Event) -> bool {
        self.tx
            .send(IngressEvent {
                event: Box::new(event),
                origin: Origin::Local,
            })
            .await
            .is_ok()
    }

    /// Submits a sync-fetched event, blocking like a local producer.
    pub async fn submit_synced(&self, event: Event) -> bool {
        self.tx
            .send(IngressEvent {
                event: Box::new(event),
                origin: Origin::Sync,
            })
            .await
            .is_ok()
    }

    /// Submits a peer-delivered event without blocking. Returns false when
    /// the event was shed; the caller is expected to count the drop.
    pub fn submit_peer(&self, event: Event) -> bool {
        self.tx
            .try_send(IngressEvent {
                event: Box::new(event),
                origin: Origin::Peer,
            })
            .is_ok()
    }
}

const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// Runs the single-threaded dispatcher until shutdown, then drains pending
/// events under a two-second deadline.
pub fn spawn_dispatcher(
    ctx: Arc<NodeContext>,
    mut rx: mpsc::Receiver<IngressEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(target: "ingress", "event dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        drain(&ctx, &mut rx).await;
                        break;
                    }
                }
                next = rx.recv() => match next {
                    Some(work) => handle(&ctx, work).await,
                    None => break,
                }
            }
        }
        tracing::info!(target: "ingress", "event dispatcher stopped");
    })
}

async fn handle(ctx: &NodeContext, work: IngressEvent) {
    let id = work.event.id.clone();
    match pipeline::process_event(ctx, *work.event, work.origin).await {
        Ok(outcome) => {
            tracing::debug!(target: "ingress", event = %id, ?outcome, "processed");
        }
        Err(e) => {
            tracing::warn!(target: "ingress", event = %id, error = %e, "pipeline error");
        }
    }
}

async fn drain(ctx: &NodeContext, rx: &mut mpsc::Receiver<IngressEvent>) {
    let deadline = Instant::now() + DRAIN_DEADLINE;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(work)) => handle(ctx, work).await,
            _ => break,
        }
    }
}

/// Counts one shed peer event. Kept beside the sender so every ingress
/// producer records drops the same way.
pub fn count_dropped(ctx: &NodeContext) {
    let current = ctx
        .stores
        .get_counter(StoreName::NetworkStats, keys::DROPPED_INGRESS_KEY)
        .unwrap_or(0);
    ctx.stores
        .put(
            StoreName::NetworkStats,
            keys::DROPPED_INGRESS_KEY,
            mlayer_storage::encode_u64(current + 1).to_vec(),
        )
        .ok();
}
