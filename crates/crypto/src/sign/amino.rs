// Path: crates/crypto/src/sign/amino.rs
//! Tendermint Amino (ADR-036) signature verification for cross-chain
//! wallets.
//!
//! An ADR-036 signature covers the SHA-256 of a `StdSignDoc` with empty
//! chain id, zero account number/sequence, a zero fee and a single
//! `sign/MsgSignData` message holding the signer address and the base64
//! payload. JSON keys are emitted sorted, which `serde_json`'s default map
//! representation guarantees.

use crate::CryptoError;
use base64::Engine;
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde_json::json;

/// Builds the canonical ADR-036 sign-doc bytes for a signer and a base64
/// payload.
pub fn sign_doc_bytes(signer: &str, data_b64: &str) -> Result<Vec<u8>, CryptoError> {
    let doc = json!({
        "account_number": "0",
        "chain_id": "",
        "fee": { "amount": [], "gas": "0" },
        "memo": "",
        "msgs": [{
            "type": "sign/MsgSignData",
            "value": { "data": data_b64, "signer": signer }
        }],
        "sequence": "0"
    });
    serde_json::to_vec(&doc).map_err(|e| CryptoError::OperationFailed(e.to_string()))
}

/// Verifies a Tendermint Amino signature.
///
/// `message_b64` is the base64 payload embedded in the sign doc, `signature`
/// the raw 64-byte secp256k1 signature, `signer` the bech32 account the doc
/// names, and `public_key` the signer's compressed secp256k1 key. Binding
/// `public_key` to `signer` is the account mapping's concern.
pub fn verify_amino(
    message_b64: &str,
    signature: &[u8],
    signer: &str,
    public_key: &[u8],
) -> Result<bool, CryptoError> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::BadPublicKey(e.to_string()))?;
    let sig =
        Signature::from_slice(signature).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let doc = sign_doc_bytes(signer, message_b64)?;
    // k256's Verifier hashes the message with SHA-256, exactly the ADR-036
    // prehash.
    Ok(key.verify(&doc, &sig).is_ok())
}

/// Base64-string convenience wrapper matching the wire form of payload
/// signatures.
pub fn verify_amino_b64(
    message_b64: &str,
    signature_b64: &str,
    signer: &str,
    public_key_b64: &str,
) -> Result<bool, CryptoError> {
    let std = base64::engine::general_purpose::STANDARD;
    let raw = base64::engine::general_purpose::STANDARD_NO_PAD;
    let sig = std
        .decode(signature_b64)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let key = raw
        .decode(public_key_b64.trim_end_matches('='))
        .map_err(|e| CryptoError::BadPublicKey(e.to_string()))?;
    verify_amino(message_b64, &sig, signer, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;
    use k256::ecdsa::{signature::hazmat::PrehashSigner, SigningKey};

    fn sign_doc(key: &SigningKey, signer: &str, data_b64: &str) -> Vec<u8> {
        let doc = sign_doc_bytes(signer, data_b64).unwrap();
        let sig: Signature = key.sign_prehash(&sha256(&doc)).unwrap();
        sig.to_vec()
    }

    #[test]
    fn verifies_a_doc_signed_over_sha256() {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let pubkey = key.verifying_key().to_encoded_point(true);
        let data = base64::engine::general_purpose::STANDARD.encode(b"helloworld");
        let sig = sign_doc(&key, "cosmos1signer", &data);
        assert!(verify_amino(&data, &sig, "cosmos1signer", pubkey.as_bytes()).unwrap());
    }

    #[test]
    fn signer_is_bound_into_the_doc() {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let pubkey = key.verifying_key().to_encoded_point(true);
        let data = base64::engine::general_purpose::STANDARD.encode(b"helloworld");
        let sig = sign_doc(&key, "cosmos1signer", &data);
        assert!(!verify_amino(&data, &sig, "cosmos1other", pubkey.as_bytes()).unwrap());
    }

    #[test]
    fn doc_keys_are_sorted() {
        let doc = sign_doc_bytes("s", "ZGF0YQ==").unwrap();
        let text = String::from_utf8(doc).unwrap();
        let account = text.find("account_number").unwrap();
        let chain = text.find("chain_id").unwrap();
        let seq = text.find("sequence").unwrap();
        assert!(account < chain && chain < seq);
    }
}
