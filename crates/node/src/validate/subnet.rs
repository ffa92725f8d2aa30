// Path: crates/node/src/validate/subnet.rs

use super::{require_agent_privilege, verify_payload_signature, ValidationFailure};
use crate::context::NodeContext;
use mlayer_types::entities::{ClientPayload, Privilege, Subnet, MAX_SUBNET_REF_LEN};
use mlayer_types::error::AppError;

const ACTION: &str = "write_subnet";

fn is_alphanumeric_dot(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}

/// Subnet rules: ref bounds, signer authority, and an admin grant when an
/// agent updates an existing subnet.
pub fn validate(
    ctx: &NodeContext,
    payload: &ClientPayload,
    data: &Subnet,
) -> Result<(), ValidationFailure> {
    if data.reference.len() > MAX_SUBNET_REF_LEN {
        return Err(AppError::BadRequest(
            "subnet ref cannot be more than 64 characters".into(),
        )
        .into());
    }
    if !data.reference.is_empty() && !is_alphanumeric_dot(&data.reference) {
        return Err(AppError::BadRequest(
            "ref can only include alpha-numerics and .".into(),
        )
        .into());
    }

    // An agent touching an existing subnet must hold an admin grant on it.
    if !payload.agent.is_empty() && !data.id.is_empty() {
        require_agent_privilege(
            ctx,
            &payload.account,
            &payload.agent,
            &data.id,
            Privilege::Admin,
            payload.timestamp,
        )?;
    }

    let signer = if payload.agent.is_empty() {
        payload.account.as_str()
    } else {
        payload.agent.as_str()
    };
    verify_payload_signature(ctx, payload, signer, ACTION, &data.reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_charset_is_alnum_dot_only() {
        assert!(is_alphanumeric_dot("acme.chat01"));
        assert!(!is_alphanumeric_dot("acme-chat"));
        assert!(!is_alphanumeric_dot("acme chat"));
    }
}
