// Path: crates/node/src/sync.rs

//! The point-to-point sync engine.
//!
//! When the pipeline parks an event on a missing dependency, a sync job is
//! enqueued here. The engine asks a randomly chosen connected peer for the
//! missing event or state over the signed request/response channel, verifies
//! the answer by the same authority and signature rules the pipeline
//! applies, and re-enters the result through ingress. Failed attempts move
//! to another peer with jittered exponential backoff.

use crate::context::{now_ms, NodeContext};
use libp2p::PeerId;
use mlayer_crypto::sign::ed25519;
use mlayer_networking::libp2p::{
    P2pAction, P2pPayload, P2pResponse, StateQuery, SwarmCommand,
};
use mlayer_types::codec;
use mlayer_types::entities::{EntityModel, Event, EventPath};
use mlayer_types::error::SyncError;
use mlayer_types::keys;
use mlayer_storage::StoreName;
use rand::seq::IteratorRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const MAX_ATTEMPTS: u32 = 3;

/// Work for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncJob {
    /// Fetch one event by path.
    Event(EventPath),
    /// Fetch an entity's current state.
    State {
        /// The entity's model.
        model: EntityModel,
        /// The entity's id.
        id: String,
    },
}

/// Spawns the worker that drains the sync-job channel.
pub fn spawn_sync_worker(
    ctx: Arc<NodeContext>,
    mut rx: mpsc::Receiver<SyncJob>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => if *shutdown.borrow() { break; },
                job = rx.recv() => match job {
                    Some(SyncJob::Event(path)) => {
                        if let Err(e) = sync_event_by_path(&ctx, &path, None).await {
                            tracing::warn!(target: "sync", path = %path.key(), error = %e, "event sync failed");
                        }
                    }
                    Some(SyncJob::State { model, id }) => {
                        if let Err(e) = sync_state_by_id(&ctx, model, &id).await {
                            tracing::warn!(target: "sync", %model, %id, error = %e, "state sync failed");
                        }
                    }
                    None => break,
                }
            }
        }
    })
}

async fn pick_peer(ctx: &NodeContext, exclude: &[PeerId]) -> Option<PeerId> {
    let peers = ctx.connected_peers.lock().await;
    peers
        .iter()
        .filter(|p| !exclude.contains(p))
        .choose(&mut rand::thread_rng())
        .copied()
}

fn jittered_backoff(base: Duration, attempt: u32) -> Duration {
    let exp = base.as_millis() as u64 * 2u64.pow(attempt);
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((exp as f64 * jitter) as u64)
}

async fn request(
    ctx: &NodeContext,
    peer: PeerId,
    action: P2pAction,
    payload: Vec<u8>,
) -> Result<P2pResponse, SyncError> {
    let mut frame = P2pPayload::new(action, payload, now_ms());
    frame
        .sign(&ctx.keypair)
        .map_err(|e| SyncError::BadData(e.to_string()))?;
    let (reply_tx, reply_rx) = oneshot::channel();
    ctx.swarm
        .send(SwarmCommand::SendRequest {
            peer,
            request: frame,
            reply: reply_tx,
        })
        .await
        .map_err(|e| SyncError::BadData(format!("swarm channel closed: {e}")))?;
    match tokio::time::timeout(ctx.config.peer_request_timeout, reply_rx).await {
        Ok(Ok(Ok(response))) => Ok(response),
        Ok(Ok(Err(e))) => Err(SyncError::BadData(e.to_string())),
        Ok(Err(_)) => Err(SyncError::BadData("request dropped".into())),
        Err(_) => Err(SyncError::BadData("request timed out".into())),
    }
}

/// Verifies a peer-supplied event by the pipeline's own authority rules.
fn verify_fetched_event(ctx: &NodeContext, event: &Event) -> bool {
    if !ctx.chain.is_validator(&event.validator) {
        return false;
    }
    if !event.id_is_consistent().unwrap_or(false) {
        return false;
    }
    let Ok(signing) = event.signing_bytes() else {
        return false;
    };
    ed25519::verify_hex(&event.validator, &signing, &event.signature).unwrap_or(false)
}

/// Fetches an event by path, preferring the local log. A fetched event is
/// verified and re-enters the pipeline through ingress.
pub async fn sync_event_by_path(
    ctx: &NodeContext,
    path: &EventPath,
    validator: Option<PeerId>,
) -> Result<Event, SyncError> {
    if let Ok(Some(bytes)) = ctx.stores.get(StoreName::Events, &keys::event_key(&path.id)) {
        if let Ok(event) = codec::from_bytes_canonical::<Event>(&bytes) {
            return Ok(event);
        }
    }

    let payload =
        codec::to_bytes_canonical(path).map_err(|e| SyncError::BadData(e.to_string()))?;
    fetch_and_ingest(ctx, validator, P2pAction::GetEvent, payload, &path.key()).await
}

/// Fetches an entity's current state (via its winning event) from a peer.
pub async fn sync_state_by_id(
    ctx: &NodeContext,
    model: EntityModel,
    id: &str,
) -> Result<Event, SyncError> {
    let query = StateQuery {
        id: id.to_string(),
        model,
    };
    let payload =
        codec::to_bytes_canonical(&query).map_err(|e| SyncError::BadData(e.to_string()))?;
    fetch_and_ingest(
        ctx,
        None,
        P2pAction::GetState,
        payload,
        &format!("{model}/{id}"),
    )
    .await
}

async fn fetch_and_ingest(
    ctx: &NodeContext,
    preferred: Option<PeerId>,
    action: P2pAction,
    payload: Vec<u8>,
    what: &str,
) -> Result<Event, SyncError> {
    let mut tried: Vec<PeerId> = Vec::new();
    let mut last_failure = String::from("no peer answered");

    for attempt in 0..MAX_ATTEMPTS {
        let peer = match preferred.filter(|p| !tried.contains(p)) {
            Some(p) => p,
            None => match pick_peer(ctx, &tried).await {
                Some(p) => p,
                None => {
                    if tried.is_empty() {
                        return Err(SyncError::NoPeer(what.to_string()));
                    }
                    break;
                }
            },
        };
        tried.push(peer);

        match request(ctx, peer, action, payload.clone()).await {
            Ok(response) if !response.is_empty() => {
                match codec::from_bytes_canonical::<Event>(&response.event) {
                    Ok(event) if verify_fetched_event(ctx, &event) => {
                        ctx.ingress.submit_synced(event.clone()).await;
                        return Ok(event);
                    }
                    Ok(_) => {
                        last_failure = format!("peer {peer} served an unverifiable event");
                        tracing::warn!(target: "sync", %peer, what, "fetched event failed verification");
                    }
                    Err(e) => {
                        last_failure = format!("peer {peer} served undecodable bytes: {e}");
                    }
                }
            }
            Ok(_) => {
                last_failure = format!("peer {peer} had no data for {what}");
            }
            Err(e) => {
                last_failure = e.to_string();
            }
        }

        if attempt + 1 < MAX_ATTEMPTS {
            tokio::time::sleep(jittered_backoff(ctx.config.sync_backoff_base, attempt)).await;
        }
    }

    Err(SyncError::Exhausted {
        attempts: tried.len() as u32,
        reason: last_failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        let base = Duration::from_millis(200);
        for attempt in 0..3 {
            let d = jittered_backoff(base, attempt).as_millis() as u64;
            let nominal = 200u64 * 2u64.pow(attempt);
            assert!(d >= nominal * 3 / 4, "attempt {attempt}: {d} too small");
            assert!(d <= nominal * 5 / 4 + 1, "attempt {attempt}: {d} too large");
        }
    }
}
