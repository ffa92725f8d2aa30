// Path: crates/node/src/validate/message.rs

use super::{verify_payload_signature, ValidationFailure};
use crate::context::NodeContext;
use mlayer_storage::StoreName;
use mlayer_types::codec;
use mlayer_types::entities::{
    ClientPayload, EntityData, EntityModel, Message, Privilege, Subscription,
    SubscriptionStatus, Topic,
};
use mlayer_types::error::AppError;
use mlayer_types::keys;

const ACTION: &str = "send_message";

fn load_topic(ctx: &NodeContext, id: &str) -> Result<Option<Topic>, AppError> {
    let bytes = ctx.stores.get(
        StoreName::CurrentState,
        &keys::current_state_key(EntityModel::Topic, id),
    )?;
    match bytes {
        Some(bytes) => Ok(Some(codec::from_bytes_canonical(&bytes)?)),
        None => Ok(None),
    }
}

fn load_subscription(
    ctx: &NodeContext,
    topic: &str,
    subscriber: &str,
) -> Result<Option<Subscription>, AppError> {
    let probe = Subscription {
        topic: topic.into(),
        subscriber: subscriber.into(),
        ..Default::default()
    };
    let id = probe.derive_id()?;
    let bytes = ctx.stores.get(
        StoreName::CurrentState,
        &keys::current_state_key(EntityModel::Subscription, &id),
    )?;
    match bytes {
        Some(bytes) => Ok(Some(codec::from_bytes_canonical(&bytes)?)),
        None => Ok(None),
    }
}

/// Message rules: the topic exists and is writable by the sender, who holds
/// an approved write subscription (the topic owner writes freely), and the
/// body stays inside the configured bound.
pub fn validate(
    ctx: &NodeContext,
    payload: &ClientPayload,
    data: &Message,
) -> Result<(), ValidationFailure> {
    if data.topic.is_empty() {
        return Err(AppError::BadRequest("message topic is required".into()).into());
    }
    if data.data_hash.is_empty() {
        return Err(AppError::BadRequest("message body hash is required".into()).into());
    }
    let body_refs: usize = data.attachments.iter().map(|a| a.len()).sum();
    if body_refs > ctx.config.max_message_body_bytes {
        return Err(AppError::BadRequest("message exceeds size limit".into()).into());
    }

    let Some(topic) = load_topic(ctx, &data.topic)? else {
        return Err(ValidationFailure::MissingState {
            model: EntityModel::Topic,
            id: data.topic.clone(),
        });
    };

    let sender_is_owner = data.sender == topic.owner;
    if topic.read_only && !sender_is_owner {
        return Err(AppError::Forbidden("topic is read-only".into()).into());
    }

    if !sender_is_owner {
        let subscription = load_subscription(ctx, &data.topic, &data.sender)?;
        match subscription {
            None => {
                return Err(AppError::Unauthorized("sender is not subscribed".into()).into());
            }
            Some(sub) => {
                if sub.status != SubscriptionStatus::Approved {
                    return Err(AppError::Forbidden("subscription is not active".into()).into());
                }
                if sub.role < Privilege::Write {
                    return Err(AppError::Forbidden("subscription grants read only".into()).into());
                }
            }
        }
    }

    verify_payload_signature(ctx, payload, &data.sender, ACTION, &data.topic)
}
