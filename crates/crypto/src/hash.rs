// Path: crates/crypto/src/hash.rs
//! Digest helpers shared by the signature schemes.

use sha2::{Digest as Sha2Digest, Sha256};
use sha3::{Digest as Sha3Digest, Keccak256};

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(data);
    h.finalize().into()
}

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

/// The Ethereum personal-message digest:
/// `keccak256("\x19Ethereum Signed Message:\n" || len(m) || m)`.
pub fn eth_personal_digest(message: &[u8]) -> [u8; 32] {
    let mut prefixed =
        Vec::with_capacity(message.len() + 32);
    prefixed.extend_from_slice(b"\x19Ethereum Signed Message:\n");
    prefixed.extend_from_slice(message.len().to_string().as_bytes());
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_matches_known_vector() {
        // keccak256("") from the Ethereum yellow paper.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn personal_digest_depends_on_length_prefix() {
        // Same bytes, different framing, must differ from the bare hash.
        assert_ne!(eth_personal_digest(b"hello"), keccak256(b"hello"));
    }
}
