// Path: crates/node/src/validate/mod.rs

//! Per-entity payload validators.
//!
//! Every validator runs the common signature check — the client signs the
//! fixed JSON template `{"action":A,"identifier":I,"network":N,"hash":H}`
//! over the payload hash — and then the entity-specific rules. Failures come
//! back typed so the pipeline can tell a final rejection from a missing
//! dependency that sync can fill in.

mod authorization;
mod message;
mod subnet;
mod subscription;
mod topic;
mod wallet;

use crate::context::NodeContext;
use base64::Engine;
use mlayer_crypto::hash::eth_personal_digest;
use mlayer_crypto::sign::{amino, ed25519, secp};
use mlayer_types::entities::{
    ClientPayload, EntityModel, Event, PayloadData, SignatureType,
};
use mlayer_types::error::AppError;

/// A validation failure: either final, or a state dependency the sync
/// engine can resolve.
#[derive(Debug)]
pub enum ValidationFailure {
    /// Final for this payload; persisted on the event record.
    App(AppError),
    /// A state row we do not have yet.
    MissingState {
        /// The missing entity's model.
        model: EntityModel,
        /// The missing entity's id.
        id: String,
    },
}

impl ValidationFailure {
    /// The error recorded on the event when the failure stands.
    pub fn as_app_error(&self) -> AppError {
        match self {
            ValidationFailure::App(e) => e.clone(),
            ValidationFailure::MissingState { model, id } => {
                AppError::NotFound(format!("{model} {id} not found"))
            }
        }
    }
}

impl From<AppError> for ValidationFailure {
    fn from(e: AppError) -> Self {
        ValidationFailure::App(e)
    }
}

/// Dispatches to the entity-specific validator.
pub fn validate_payload(ctx: &NodeContext, event: &Event) -> Result<(), ValidationFailure> {
    match &event.payload.data {
        PayloadData::Subnet(data) => subnet::validate(ctx, &event.payload, data),
        PayloadData::Authorization(data) => authorization::validate(ctx, &event.payload, data),
        PayloadData::Topic(data) => topic::validate(ctx, &event.payload, data),
        PayloadData::Subscription(data) => subscription::validate(ctx, &event.payload, data),
        PayloadData::Message(data) => message::validate(ctx, &event.payload, data),
        PayloadData::Wallet(data) => wallet::validate(ctx, &event.payload, data),
    }
}

/// The address component of a DID string (`did:0xabc...` → `0xabc...`).
pub fn address_of_did(did: &str) -> &str {
    did.rsplit(':').next().unwrap_or(did)
}

/// The signed authorization template for a payload: action, an entity
/// identifier, the network chain id and the base64 payload hash.
pub fn signature_message(
    ctx: &NodeContext,
    action: &str,
    identifier: &str,
    payload: &ClientPayload,
) -> Result<String, AppError> {
    let hash_hex = payload.hash()?;
    let raw = hex::decode(&hash_hex)
        .map_err(|e| AppError::Internal(format!("payload hash not hex: {e}")))?;
    let hash_b64 = base64::engine::general_purpose::STANDARD.encode(raw);
    Ok(format!(
        "{{\"action\":\"{action}\",\"identifier\":\"{identifier}\",\"network\":\"{network}\",\"hash\":\"{hash_b64}\"}}",
        network = ctx.config.chain_id,
    ))
}

/// Verifies the payload signature under the declared signer.
///
/// `signer` is the account (or grantor / agent) address the entity rules
/// nominate. Ethereum-style signatures recover against it; Amino signatures
/// verify against the embedded public key with the signer bound into the
/// sign doc; Ed25519 device signatures verify against the embedded key.
pub fn verify_payload_signature(
    ctx: &NodeContext,
    payload: &ClientPayload,
    signer: &str,
    action: &str,
    identifier: &str,
) -> Result<(), ValidationFailure> {
    let message = signature_message(ctx, action, identifier, payload)?;
    let sig = &payload.signature;
    let valid = match sig.sig_type {
        SignatureType::EthereumSecp => {
            let digest = eth_personal_digest(message.as_bytes());
            secp::verify_by_address_hex(address_of_did(signer), &digest, &sig.signature)
                .unwrap_or(false)
        }
        SignatureType::TendermintSecp => {
            let message_b64 = base64::engine::general_purpose::STANDARD.encode(message.as_bytes());
            amino::verify_amino_b64(
                &message_b64,
                &sig.signature,
                address_of_did(signer),
                &sig.public_key,
            )
            .unwrap_or(false)
        }
        SignatureType::Ed25519 => {
            ed25519::verify_hex(&sig.public_key, message.as_bytes(), &sig.signature)
                .unwrap_or(false)
        }
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!("invalid {action} signature")).into())
    }
}

/// Requires an unexpired authorization of at least `needed` privilege for
/// `(account, agent, subnet)`. Absent grants are `Unauthorized`; present but
/// weaker grants are `Forbidden`.
pub fn require_agent_privilege(
    ctx: &NodeContext,
    account: &str,
    agent: &str,
    subnet: &str,
    needed: mlayer_types::entities::Privilege,
    reference_ts: u64,
) -> Result<(), ValidationFailure> {
    let auth = ctx
        .authorization_state(account, agent, subnet)
        .map_err(ValidationFailure::App)?;
    let Some(auth) = auth else {
        return Err(AppError::Unauthorized("agent not authorized".into()).into());
    };
    if auth.expiry != 0 && auth.expiry <= reference_ts {
        return Err(AppError::Forbidden("authorization expired".into()).into());
    }
    if auth.privilege < needed {
        return Err(AppError::Forbidden("insufficient privilege".into()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_addresses_strip_the_method_prefix() {
        assert_eq!(address_of_did("did:0xabc"), "0xabc");
        assert_eq!(address_of_did("0xabc"), "0xabc");
        assert_eq!(address_of_did("did:eth:0xdef"), "0xdef");
    }
}
