// Path: crates/node/src/validate/topic.rs

use super::{require_agent_privilege, verify_payload_signature, ValidationFailure};
use crate::context::NodeContext;
use mlayer_types::entities::{ClientPayload, EntityModel, Privilege, Topic};
use mlayer_types::error::AppError;

const ACTION: &str = "write_topic";

/// Topic rules: the owner matches the payload account, the subnet exists,
/// and an acting agent holds an admin grant on it. Handle uniqueness needs
/// no check here — the id derives from `(subnet, handle)`.
pub fn validate(
    ctx: &NodeContext,
    payload: &ClientPayload,
    data: &Topic,
) -> Result<(), ValidationFailure> {
    if data.handle.is_empty() {
        return Err(AppError::BadRequest("topic handle is required".into()).into());
    }
    if data.owner != payload.account {
        return Err(AppError::Forbidden("topic owner must match payload account".into()).into());
    }
    if data.subnet.is_empty() {
        return Err(AppError::BadRequest("topic subnet is required".into()).into());
    }
    if ctx.state_head(EntityModel::Subnet, &data.subnet)?.is_none() {
        return Err(ValidationFailure::MissingState {
            model: EntityModel::Subnet,
            id: data.subnet.clone(),
        });
    }

    if !payload.agent.is_empty() {
        require_agent_privilege(
            ctx,
            &payload.account,
            &payload.agent,
            &data.subnet,
            Privilege::Admin,
            payload.timestamp,
        )?;
    }

    let signer = if payload.agent.is_empty() {
        payload.account.as_str()
    } else {
        payload.agent.as_str()
    };
    verify_payload_signature(ctx, payload, signer, ACTION, &data.handle)
}
