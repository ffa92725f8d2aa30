// Path: crates/crypto/src/sign/secp.rs
//! SECP256k1 with Ethereum-style recovery.
//!
//! Account signatures carry no public key; the 65-byte `r || s || v`
//! signature is recovered against the signed digest and the derived address
//! compared to the claimed signer.

use crate::hash::keccak256;
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// A SECP256k1 key pair (license identity, client-side signing in tests).
#[derive(Clone)]
pub struct SecpKeyPair {
    signing: SigningKey,
}

impl SecpKeyPair {
    /// Reconstructs a key pair from a 32-byte private scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::BadPrivateKey(e.to_string()))?;
        Ok(Self { signing })
    }

    /// Reconstructs a key pair from a hex private key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim_start_matches("0x"))
            .map_err(|e| CryptoError::BadPrivateKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Generates a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// The 32-byte private scalar.
    pub fn private_key_bytes(&self) -> Vec<u8> {
        self.signing.to_bytes().to_vec()
    }

    /// The 33-byte compressed public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.signing
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// The compressed public key, hex-encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// The Ethereum address of this key, `0x`-prefixed lowercase hex.
    pub fn address(&self) -> String {
        address_of_key(self.signing.verifying_key())
    }

    /// Signs a 32-byte digest, returning the 65-byte `r || s || v` signature
    /// with `v ∈ {27, 28}`.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
        let (sig, recid) = self
            .signing
            .sign_prehash_recoverable(prehash)
            .map_err(|e| CryptoError::OperationFailed(e.to_string()))?;
        let mut out = sig.to_vec();
        out.push(27 + recid.to_byte());
        Ok(out)
    }
}

fn address_of_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed marker; the address is the last 20 bytes
    // of the keccak of the raw point.
    let digest = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Derives the Ethereum address of a hex-encoded (compressed or
/// uncompressed) public key.
pub fn address_from_public_key(public_key_hex: &str) -> Result<String, CryptoError> {
    let bytes = hex::decode(public_key_hex.trim_start_matches("0x"))
        .map_err(|e| CryptoError::BadPublicKey(e.to_string()))?;
    let key = VerifyingKey::from_sec1_bytes(&bytes)
        .map_err(|e| CryptoError::BadPublicKey(e.to_string()))?;
    Ok(address_of_key(&key))
}

/// Recovers the signer address of a 65-byte signature over a 32-byte digest.
pub fn recover_address(prehash: &[u8; 32], signature: &[u8]) -> Result<String, CryptoError> {
    if signature.len() != 65 {
        return Err(CryptoError::InvalidInput(format!(
            "expected 65-byte recoverable signature, got {}",
            signature.len()
        )));
    }
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let v = signature[64];
    let v = if v >= 27 { v - 27 } else { v };
    let recid =
        RecoveryId::from_byte(v).ok_or_else(|| CryptoError::InvalidInput("bad v byte".into()))?;
    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recid)
        .map_err(|_| CryptoError::BadSignature)?;
    Ok(address_of_key(&key))
}

/// Verifies a recoverable signature by address comparison
/// (case-insensitive).
pub fn verify_by_address(
    address: &str,
    prehash: &[u8; 32],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    let recovered = recover_address(prehash, signature)?;
    Ok(recovered.eq_ignore_ascii_case(address.trim()))
}

/// Hex-signature convenience wrapper for payload validation.
pub fn verify_by_address_hex(
    address: &str,
    prehash: &[u8; 32],
    signature_hex: &str,
) -> Result<bool, CryptoError> {
    let sig = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    verify_by_address(address, prehash, &sig)
}
