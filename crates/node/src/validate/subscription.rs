// Path: crates/node/src/validate/subscription.rs

use super::{require_agent_privilege, verify_payload_signature, ValidationFailure};
use crate::context::NodeContext;
use mlayer_types::codec;
use mlayer_types::entities::{ClientPayload, EntityModel, Privilege, Subscription, Topic};
use mlayer_types::error::AppError;
use mlayer_types::keys;
use mlayer_storage::StoreName;

const ACTION: &str = "subscribe";

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

/// Subscription rules: the subscriber signs (or an authorized agent does),
/// the topic exists, and invite-only topics demand a write grant from the
/// topic owner.
pub fn validate(
    ctx: &NodeContext,
    payload: &ClientPayload,
    data: &Subscription,
) -> Result<(), ValidationFailure> {
    if data.subscriber.is_empty() || data.topic.is_empty() {
        return Err(AppError::BadRequest("subscriber and topic are required".into()).into());
    }

    let Some(topic) = load_topic(ctx, &data.topic)? else {
        return Err(ValidationFailure::MissingState {
            model: EntityModel::Topic,
            id: data.topic.clone(),
        });
    };

    // The subscriber is the signer unless an agent authorized by the
    // subscriber signs in their place.
    if data.subscriber != payload.account {
        return Err(AppError::Forbidden("subscriber must match payload account".into()).into());
    }
    if !payload.agent.is_empty() {
        require_agent_privilege(
            ctx,
            &payload.account,
            &payload.agent,
            &topic.subnet,
            Privilege::Write,
            payload.timestamp,
        )?;
    }

    // Invite-only topics require a write grant from the topic owner to the
    // joining subscriber.
    if topic.invite_only && data.subscriber != topic.owner {
        let invite = ctx
            .authorization_state(&topic.owner, &data.subscriber, &topic.subnet)
            .map_err(ValidationFailure::App)?;
        match invite {
            Some(grant) if grant.privilege >= Privilege::Write => {}
            Some(_) => {
                return Err(AppError::Forbidden("invite grants read only".into()).into());
            }
            None => {
                return Err(AppError::Forbidden("topic is invite-only".into()).into());
            }
        }
    }

    let signer = if payload.agent.is_empty() {
        data.subscriber.as_str()
    } else {
        payload.agent.as_str()
    };
    verify_payload_signature(ctx, payload, signer, ACTION, &data.topic)
}
