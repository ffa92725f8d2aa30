// Path: crates/node/src/validate/authorization.rs

use super::{verify_payload_signature, ValidationFailure};
use crate::context::NodeContext;
use mlayer_types::entities::{Authorization, ClientPayload, EntityModel};
use mlayer_types::error::AppError;

const ACTION: &str = "grant_authorization";

/// Authorization rules: the signer is the account (or the delegating
/// grantor), the expiry lies ahead of the payload timestamp, and a scoped
/// grant needs its subnet to exist.
pub fn validate(
    ctx: &NodeContext,
    payload: &ClientPayload,
    data: &Authorization,
) -> Result<(), ValidationFailure> {
    if data.account.is_empty() || data.agent.is_empty() {
        return Err(AppError::BadRequest("account and agent are required".into()).into());
    }
    // Expiry is compared against the payload timestamp so every node
    // reaches the same verdict regardless of when it validates.
    if data.expiry != 0 && data.expiry <= payload.timestamp {
        return Err(AppError::BadRequest("authorization expiry must be in the future".into()).into());
    }

    if !data.subnet.is_empty() && ctx.state_head(EntityModel::Subnet, &data.subnet)?.is_none() {
        return Err(ValidationFailure::MissingState {
            model: EntityModel::Subnet,
            id: data.subnet.clone(),
        });
    }

    let signer = if data.grantor.is_empty() {
        data.account.as_str()
    } else {
        data.grantor.as_str()
    };
    verify_payload_signature(ctx, payload, signer, ACTION, &data.agent)
}
