// Path: crates/node/src/validate/wallet.rs

use super::{verify_payload_signature, ValidationFailure};
use crate::context::NodeContext;
use mlayer_types::entities::{ClientPayload, Wallet};
use mlayer_types::error::AppError;

const ACTION: &str = "link_wallet";

/// Wallet rules: the owning account signs for the address being linked.
pub fn validate(
    ctx: &NodeContext,
    payload: &ClientPayload,
    data: &Wallet,
) -> Result<(), ValidationFailure> {
    if data.account.is_empty() || data.address.is_empty() {
        return Err(AppError::BadRequest("wallet account and address are required".into()).into());
    }
    if data.account != payload.account {
        return Err(AppError::Forbidden("wallet owner must match payload account".into()).into());
    }
    verify_payload_signature(ctx, payload, &data.account, ACTION, &data.address)
}
