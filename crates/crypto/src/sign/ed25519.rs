// Path: crates/crypto/src/sign/ed25519.rs
//! Ed25519 signing for validator identities and event signatures.

use crate::CryptoError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// An Ed25519 key pair held by the node.
#[derive(Clone)]
pub struct Ed25519KeyPair {
    signing: SigningKey,
}

impl Ed25519KeyPair {
    /// Generates a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| CryptoError::BadPrivateKey("expected 32-byte seed".into()))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Reconstructs a key pair from a hex seed.
    pub fn from_hex(seed_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(seed_hex.trim_start_matches("0x"))
            .map_err(|e| CryptoError::BadPrivateKey(e.to_string()))?;
        Self::from_seed(&bytes)
    }

    /// The 32-byte public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// The public key, hex-encoded as it appears on events.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// The 32-byte private seed.
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Signs a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Signs a message, returning the signature hex-encoded.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }
}

/// Verifies an Ed25519 signature under a 32-byte public key.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::BadPublicKey("expected 32-byte key".into()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::BadPublicKey(e.to_string()))?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidInput("expected 64-byte signature".into()))?;
    let sig = Signature::from_bytes(&sig_bytes);
    Ok(key.verify(message, &sig).is_ok())
}

/// Verifies with hex-encoded key and signature, the form events carry.
pub fn verify_hex(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<bool, CryptoError> {
    let key = hex::decode(public_key_hex.trim_start_matches("0x"))
        .map_err(|e| CryptoError::BadPublicKey(e.to_string()))?;
    let sig = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    verify(&key, message, &sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let pair = Ed25519KeyPair::generate();
        let msg = b"canonical event bytes";
        let sig = pair.sign(msg);
        assert!(verify(&pair.public_key(), msg, &sig).unwrap());
    }

    #[test]
    fn wrong_signer_fails() {
        let pair = Ed25519KeyPair::generate();
        let other = Ed25519KeyPair::generate();
        let msg = b"canonical event bytes";
        let sig = pair.sign(msg);
        assert!(!verify(&other.public_key(), msg, &sig).unwrap());
    }

    #[test]
    fn tampered_message_fails() {
        let pair = Ed25519KeyPair::generate();
        let sig = pair.sign(b"original");
        assert!(!verify(&pair.public_key(), b"tampered", &sig).unwrap());
    }

    #[test]
    fn seed_roundtrip_preserves_identity() {
        let pair = Ed25519KeyPair::generate();
        let restored = Ed25519KeyPair::from_seed(&pair.seed()).unwrap();
        assert_eq!(pair.public_key(), restored.public_key());
    }
}
