// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for all replicated data.
//!
//! Values are encoded as self-describing MessagePack maps whose keys are the
//! short, stable field tags clients depend on (`pld`, `sig`, `ts`, ...).
//! Determinism rules:
//!
//! - struct fields are emitted in declaration order, which is kept sorted by
//!   tag throughout the entity model;
//! - null and empty-string fields are omitted entirely, never emitted as
//!   zero values;
//! - integers and string lengths are MessagePack big-endian.
//!
//! Two encodings of semantically equal values are therefore byte-equal, which
//! is what makes identity hashing (I1) and event integrity (I2) hold. By
//! centralizing the codec here in the base `types` crate we ensure every
//! component uses the exact same serialization for hashing, signing and
//! transfer.

use crate::error::CodecError;
use serde::{de::DeserializeOwned, Serialize};
use sha3::{Digest, Keccak256};

/// Encodes a value into its canonical byte representation.
pub fn to_bytes_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec_named(v).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a value from its canonical byte representation.
///
/// Fails fast on any decoding error so malformed peer data never reaches the
/// pipeline half-parsed.
pub fn from_bytes_canonical<T: DeserializeOwned>(b: &[u8]) -> Result<T, CodecError> {
    rmp_serde::from_slice(b).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Keccak-256 of a byte slice.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Keccak-256 over the canonical encoding of a value.
pub fn canonical_digest<T: Serialize>(v: &T) -> Result<[u8; 32], CodecError> {
    Ok(keccak256(&to_bytes_canonical(v)?))
}

/// Hex-encoded [`canonical_digest`], the form used for ids and hashes at the
/// API surface.
pub fn canonical_hash_hex<T: Serialize>(v: &T) -> Result<String, CodecError> {
    Ok(hex::encode(canonical_digest(v)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
    struct Probe {
        #[serde(rename = "a", default, skip_serializing_if = "String::is_empty")]
        alpha: String,
        #[serde(rename = "n", default)]
        num: u64,
        #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    }

    #[test]
    fn roundtrip_is_identity() {
        let v = Probe {
            alpha: "ref.one".into(),
            num: 42,
            tag: Some("x".into()),
        };
        let bytes = to_bytes_canonical(&v).unwrap();
        let back: Probe = from_bytes_canonical(&bytes).unwrap();
        assert_eq!(v, back);
        // canonical(decode(canonical(x))) == canonical(x)
        assert_eq!(bytes, to_bytes_canonical(&back).unwrap());
    }

    #[test]
    fn empty_fields_are_omitted() {
        let explicit = Probe {
            alpha: String::new(),
            num: 7,
            tag: None,
        };
        let trimmed = to_bytes_canonical(&explicit).unwrap();
        // Only the `n` key should be present in the map.
        let full = to_bytes_canonical(&Probe {
            alpha: "x".into(),
            num: 7,
            tag: Some("y".into()),
        })
        .unwrap();
        assert!(trimmed.len() < full.len());
        let back: Probe = from_bytes_canonical(&trimmed).unwrap();
        assert_eq!(back, explicit);
    }

    #[test]
    fn equal_values_encode_byte_equal() {
        let a = Probe {
            alpha: "same".into(),
            num: 1,
            tag: None,
        };
        let b = Probe {
            alpha: "same".into(),
            num: 1,
            tag: None,
        };
        assert_eq!(
            to_bytes_canonical(&a).unwrap(),
            to_bytes_canonical(&b).unwrap()
        );
        assert_eq!(canonical_digest(&a).unwrap(), canonical_digest(&b).unwrap());
    }

    #[test]
    fn decode_failure_is_reported() {
        let mut bytes = to_bytes_canonical(&Probe {
            alpha: "x".into(),
            num: 3,
            tag: None,
        })
        .unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(from_bytes_canonical::<Probe>(&bytes).is_err());
    }
}
