// Path: crates/node/src/pipeline.rs

//! The per-event pipeline.
//!
//! One event goes in; the steps run strictly in order: deduplicate,
//! validator authority, event signature, dependency preconditions, payload
//! validation, ordering decision, transactional apply, broadcast, notify.
//! The apply step is a single write batch — the event log row, the
//! current-or-historic state row and the account counter land together or
//! not at all.

use crate::context::NodeContext;
use crate::ingress::Origin;
use crate::ordering::is_more_recent;
use crate::sync::SyncJob;
use crate::validate::{self, ValidationFailure};
use mlayer_crypto::sign::ed25519;
use mlayer_storage::{encode_u64, StoreName, WriteBatch};
use mlayer_types::codec;
use mlayer_types::entities::{
    EntityData, EntityModel, Event, EventPath, PayloadData, StateHead,
};
use mlayer_types::error::AppError;
use mlayer_types::keys;
use std::time::Duration;

const APPLY_MAX_ATTEMPTS: u32 = 5;
const APPLY_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// What the pipeline did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Fully applied; `won` tells whether it became the current state.
    Applied {
        /// True when the event superseded the current state.
        won: bool,
    },
    /// Already applied earlier; no side effects.
    Duplicate,
    /// Dropped without persistence (authority or signature failure).
    Dropped(&'static str),
    /// Persisted invalid with its error attached; never broadcast further.
    Rejected,
    /// Persisted unsynced; sync jobs enqueued for the missing dependencies.
    Deferred,
}

/// Index key under which events waiting on `missing_id` are parked.
fn dep_index_key(missing_id: &str, event_id: &str) -> String {
    format!("!deps/{missing_id}/{event_id}")
}

fn dep_index_prefix(event_id: &str) -> String {
    format!("!deps/{event_id}/")
}

/// Index key for events parked on a missing state row.
fn state_dep_index_key(model: EntityModel, entity_id: &str, event_id: &str) -> String {
    format!("!sdeps/{model}/{entity_id}/{event_id}")
}

fn state_dep_index_prefix(model: EntityModel, entity_id: &str) -> String {
    format!("!sdeps/{model}/{entity_id}/")
}

fn bump_metric(ctx: &NodeContext, key: &str) {
    let current = ctx
        .stores
        .get_counter(StoreName::NetworkStats, key)
        .unwrap_or(0);
    ctx.stores
        .put(
            StoreName::NetworkStats,
            key,
            encode_u64(current + 1).to_vec(),
        )
        .ok();
}

/// Runs one event through the full pipeline.
pub async fn process_event(
    ctx: &NodeContext,
    mut event: Event,
    origin: Origin,
) -> Result<PipelineOutcome, AppError> {
    let model = event.model();
    let entity_id = event.payload.data.entity_id()?;

    // 1. Deduplicate: a synced copy in the log means we are done.
    if let Some(bytes) = ctx.stores.get(StoreName::Events, &keys::event_key(&event.id))? {
        let stored: Event = codec::from_bytes_canonical(&bytes)?;
        if stored.synced == Some(true) {
            return Ok(PipelineOutcome::Duplicate);
        }
    }

    // 2. Validator authority: only licensed validators may author events.
    if !ctx.chain.is_validator(&event.validator) {
        bump_metric(ctx, keys::INVALID_VALIDATOR_KEY);
        tracing::debug!(target: "pipeline", event = %event.id, validator = %event.validator, "dropping event from unknown validator");
        return Ok(PipelineOutcome::Dropped("invalid-validator"));
    }

    // 3. Event integrity and signature. The payload's chosen validator must
    //    also be the address the chain maps this Ed25519 key to.
    let signing = event.signing_bytes()?;
    let signature_ok =
        ed25519::verify_hex(&event.validator, &signing, &event.signature).unwrap_or(false);
    let id_ok = event.id_is_consistent().unwrap_or(false);
    let address_ok = ctx
        .chain
        .validator_address(&event.validator)
        .map(|addr| {
            addr.eq_ignore_ascii_case(validate::address_of_did(&event.payload.validator))
        })
        .unwrap_or(false);
    if !signature_ok || !id_ok || !address_ok {
        bump_metric(ctx, keys::INVALID_SIGNATURE_KEY);
        tracing::debug!(
            target: "pipeline",
            event = %event.id,
            signature_ok,
            id_ok,
            address_ok,
            "dropping event with bad signature"
        );
        return Ok(PipelineOutcome::Dropped("invalid-signature"));
    }

    // 4. Preconditions: the previous event on this entity and the
    //    authorizing event must exist locally (or be vacuous).
    let head = ctx.state_head(model, &entity_id)?;
    let prev_ok = match &event.previous_event {
        None => true,
        Some(path) if path.id.is_empty() => head.is_none(),
        Some(path) => ctx.stores.has(StoreName::Events, &keys::event_key(&path.id))?,
    };
    let auth_ok = match &event.auth_event {
        None => true,
        Some(path) if path.id.is_empty() => true,
        Some(path) => ctx.stores.has(StoreName::Events, &keys::event_key(&path.id))?,
    };
    if !prev_ok || !auth_ok {
        return defer_for_sync(ctx, event, origin, prev_ok, auth_ok).await;
    }

    // 5. Payload validation.
    if let Err(failure) = validate::validate_payload(ctx, &event) {
        return reject_payload(ctx, event, origin, failure).await;
    }

    // 6. Ordering decision against the current state's winning event.
    let won = match &head {
        None => true,
        Some(head) => match winning_event(ctx, head)? {
            None => true,
            Some(current) => is_more_recent(
                current.payload.timestamp,
                &current.hash,
                event.payload.timestamp,
                &event.hash,
            ),
        },
    };

    // 7. Apply in one transaction. The state row is a stamped clone of the
    //    payload data; the logged event keeps its sealed content so its id
    //    stays verifiable.
    event.subnet = resolved_subnet(model, &entity_id, &event);
    event.synced = Some(true);
    event.is_valid = Some(true);
    event.error = String::new();
    if origin != Origin::Local {
        event.broadcasted = true;
    }
    let state_bytes = finalize_state(event.payload.data.clone(), &event, &entity_id)?;

    let mut batch = WriteBatch::default();
    batch.put(
        StoreName::Events,
        keys::event_key(&event.id),
        codec::to_bytes_canonical(&event)?,
    );
    if won {
        // The displaced state is non-winning from here on; archive it under
        // the event that produced it before overwriting.
        if let Some(head) = &head {
            if let Some(old_path) = &head.event {
                if let Some(old_bytes) = ctx
                    .stores
                    .get(StoreName::CurrentState, &keys::current_state_key(model, &entity_id))?
                {
                    batch.put(
                        StoreName::HistoricState,
                        keys::historic_state_key(model, &entity_id, &old_path.id),
                        old_bytes,
                    );
                }
            }
        }
        batch.put(
            StoreName::CurrentState,
            keys::current_state_key(model, &entity_id),
            state_bytes,
        );
    } else {
        batch.put(
            StoreName::HistoricState,
            keys::historic_state_key(model, &entity_id, &event.id),
            state_bytes,
        );
    }
    let account_key = keys::account_counter_key(&event.payload.account);
    let account_count = ctx.stores.get_counter(StoreName::EventCount, &account_key)?;
    batch.put(
        StoreName::EventCount,
        account_key,
        encode_u64(account_count + 1).to_vec(),
    );
    apply_with_retry(ctx, batch, &event).await?;

    // Hand the applied event to the stats aggregator; a full channel sheds
    // the sample, never the apply.
    ctx.counters.try_send(Box::new(event.clone())).ok();

    // 8. Broadcast locally originated events, then flip the flag.
    if origin == Origin::Local && !event.broadcasted {
        publish(ctx, &event).await;
        event.broadcasted = true;
        ctx.stores.put(
            StoreName::Events,
            &keys::event_key(&event.id),
            codec::to_bytes_canonical(&event)?,
        )?;
    }

    // 9. Notify subscribers and wake events that were waiting on this one.
    let message_topic = match &event.payload.data {
        PayloadData::Message(m) => Some(m.topic.clone()),
        _ => None,
    };
    ctx.fanout.notify(&event, message_topic.as_deref());
    if origin != Origin::Local {
        requeue_dependents(ctx, &event.id).await?;
    }
    // Events parked on this entity's state can run now regardless of who
    // produced the state.
    requeue_state_dependents(ctx, model, &entity_id).await?;

    Ok(PipelineOutcome::Applied { won })
}

/// Step 4 failure path: persist unsynced, index the event under its missing
/// dependencies, enqueue sync jobs, and still gossip local events so peers
/// can resolve their own chains.
async fn defer_for_sync(
    ctx: &NodeContext,
    mut event: Event,
    origin: Origin,
    prev_ok: bool,
    auth_ok: bool,
) -> Result<PipelineOutcome, AppError> {
    let mut missing: Vec<EventPath> = Vec::new();
    if !prev_ok {
        if let Some(path) = &event.previous_event {
            missing.push(path.clone());
        }
    }
    if !auth_ok {
        if let Some(path) = &event.auth_event {
            missing.push(path.clone());
        }
    }
    // An empty id cannot be fetched; the event stays parked until the
    // conflicting local state resolves.
    missing.retain(|path| !path.id.is_empty());

    event.synced = Some(false);
    let should_publish = origin == Origin::Local && !event.broadcasted;
    event.broadcasted = true;

    let mut batch = WriteBatch::default();
    batch.put(
        StoreName::Events,
        keys::event_key(&event.id),
        codec::to_bytes_canonical(&event)?,
    );
    for path in &missing {
        batch.put(
            StoreName::Events,
            dep_index_key(&path.id, &event.id),
            event.id.clone().into_bytes(),
        );
    }
    ctx.stores.commit(batch)?;

    for path in missing {
        tracing::debug!(target: "pipeline", event = %event.id, missing = %path.id, "dependency miss; sync enqueued");
        ctx.sync_jobs.try_send(SyncJob::Event(path)).ok();
    }
    if should_publish {
        publish(ctx, &event).await;
    }
    Ok(PipelineOutcome::Deferred)
}

/// Step 5 failure path. Local events abort to the caller; peer events are
/// either deferred (missing state a sync can fill) or persisted invalid.
async fn reject_payload(
    ctx: &NodeContext,
    mut event: Event,
    origin: Origin,
    failure: ValidationFailure,
) -> Result<PipelineOutcome, AppError> {
    let error = failure.as_app_error();
    if origin == Origin::Local {
        return Err(error);
    }

    if let ValidationFailure::MissingState { model, id } = &failure {
        event.synced = Some(false);
        event.broadcasted = true;
        let mut batch = WriteBatch::default();
        batch.put(
            StoreName::Events,
            keys::event_key(&event.id),
            codec::to_bytes_canonical(&event)?,
        );
        batch.put(
            StoreName::Events,
            state_dep_index_key(*model, id, &event.id),
            event.id.clone().into_bytes(),
        );
        ctx.stores.commit(batch)?;
        ctx.sync_jobs
            .try_send(SyncJob::State {
                model: *model,
                id: id.clone(),
            })
            .ok();
        return Ok(PipelineOutcome::Deferred);
    }

    event.synced = Some(true);
    event.is_valid = Some(false);
    event.broadcasted = true;
    event.error = error.to_string();
    ctx.stores.put(
        StoreName::Events,
        &keys::event_key(&event.id),
        codec::to_bytes_canonical(&event)?,
    )?;
    tracing::debug!(target: "pipeline", event = %event.id, error = %event.error, "payload rejected");
    Ok(PipelineOutcome::Rejected)
}

/// Loads the event behind a current-state head.
fn winning_event(ctx: &NodeContext, head: &StateHead) -> Result<Option<Event>, AppError> {
    let Some(path) = &head.event else {
        return Ok(None);
    };
    let bytes = ctx.stores.get(StoreName::Events, &keys::event_key(&path.id))?;
    match bytes {
        Some(bytes) => Ok(Some(codec::from_bytes_canonical(&bytes)?)),
        None => Ok(None),
    }
}

/// The subnet an event is accounted under: the entity itself for subnet
/// events, the payload's subnet otherwise.
fn resolved_subnet(model: EntityModel, entity_id: &str, event: &Event) -> String {
    if model == EntityModel::Subnet {
        entity_id.to_string()
    } else if !event.payload.subnet.is_empty() {
        event.payload.subnet.clone()
    } else {
        event.subnet.clone()
    }
}

/// Stamps the entity value with its id, the winning event pointer, chain
/// cadence and the content hash, returning the canonical row bytes.
fn finalize_state(
    mut data: PayloadData,
    event: &Event,
    entity_id: &str,
) -> Result<Vec<u8>, AppError> {
    let path = event.path();
    macro_rules! stamp {
        ($value:expr) => {{
            $value.id = entity_id.to_string();
            $value.event = Some(path.clone());
            $value.block_number = event.block_number;
            $value.cycle = event.cycle;
            $value.epoch = event.epoch;
            $value.timestamp = event.payload.timestamp;
            $value.hash = String::new();
        }};
    }
    match &mut data {
        PayloadData::Subnet(v) => stamp!(v),
        PayloadData::Authorization(v) => stamp!(v),
        PayloadData::Topic(v) => stamp!(v),
        PayloadData::Subscription(v) => stamp!(v),
        PayloadData::Message(v) => stamp!(v),
        PayloadData::Wallet(v) => stamp!(v),
    }
    let hash = data.canonical_hash()?;
    match &mut data {
        PayloadData::Subnet(v) => v.hash = hash,
        PayloadData::Authorization(v) => v.hash = hash,
        PayloadData::Topic(v) => v.hash = hash,
        PayloadData::Subscription(v) => v.hash = hash,
        PayloadData::Message(v) => v.hash = hash,
        PayloadData::Wallet(v) => v.hash = hash,
    }
    Ok(data.to_state_bytes()?)
}

/// Commits the apply batch, retrying transient store failures with
/// exponential backoff before burying the event in the dead-letter store.
async fn apply_with_retry(
    ctx: &NodeContext,
    batch: WriteBatch,
    event: &Event,
) -> Result<(), AppError> {
    let mut last_error = None;
    for attempt in 0..APPLY_MAX_ATTEMPTS {
        match ctx.stores.commit(batch.clone()) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(target: "pipeline", event = %event.id, attempt, error = %e, "apply failed; backing off");
                last_error = Some(e);
                if attempt + 1 < APPLY_MAX_ATTEMPTS {
                    tokio::time::sleep(APPLY_BACKOFF_BASE * 2u32.pow(attempt)).await;
                }
            }
        }
    }
    let key = keys::dead_letter_key(&event.id, APPLY_MAX_ATTEMPTS);
    ctx.stores
        .put(
            StoreName::DeadLetters,
            &key,
            codec::to_bytes_canonical(event)?,
        )
        .ok();
    Err(AppError::Transient(format!(
        "apply failed after {APPLY_MAX_ATTEMPTS} attempts: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

async fn publish(ctx: &NodeContext, event: &Event) {
    let Ok(data) = codec::to_bytes_canonical(event) else {
        return;
    };
    ctx.swarm
        .send(mlayer_networking::libp2p::SwarmCommand::PublishEvent {
            model: event.model(),
            data,
        })
        .await
        .ok();
}

/// Re-feeds events whose previous-event pointer was waiting on `event_id`.
async fn requeue_dependents(ctx: &NodeContext, event_id: &str) -> Result<(), AppError> {
    let waiting = ctx.stores.iter_prefix(
        StoreName::Events,
        &dep_index_prefix(event_id),
        256,
        None,
    )?;
    if waiting.is_empty() {
        return Ok(());
    }
    let mut batch = WriteBatch::default();
    for (index_key, dependent_id) in &waiting {
        batch.delete(StoreName::Events, index_key);
        let dependent_id = String::from_utf8_lossy(dependent_id).into_owned();
        if let Some(bytes) = ctx
            .stores
            .get(StoreName::Events, &keys::event_key(&dependent_id))?
        {
            let dependent: Event = codec::from_bytes_canonical(&bytes)?;
            tracing::debug!(target: "pipeline", dependent = %dependent.id, resolved = %event_id, "requeueing dependent event");
            ctx.ingress.submit_synced(dependent).await;
        }
    }
    ctx.stores.commit(batch)?;
    Ok(())
}

/// Re-feeds events that were parked waiting for this entity's state row.
async fn requeue_state_dependents(
    ctx: &NodeContext,
    model: EntityModel,
    entity_id: &str,
) -> Result<(), AppError> {
    let waiting = ctx.stores.iter_prefix(
        StoreName::Events,
        &state_dep_index_prefix(model, entity_id),
        256,
        None,
    )?;
    if waiting.is_empty() {
        return Ok(());
    }
    let mut batch = WriteBatch::default();
    for (index_key, dependent_id) in &waiting {
        batch.delete(StoreName::Events, index_key);
        let dependent_id = String::from_utf8_lossy(dependent_id).into_owned();
        if let Some(bytes) = ctx
            .stores
            .get(StoreName::Events, &keys::event_key(&dependent_id))?
        {
            let dependent: Event = codec::from_bytes_canonical(&bytes)?;
            ctx.ingress.submit_synced(dependent).await;
        }
    }
    ctx.stores.commit(batch)?;
    Ok(())
}
