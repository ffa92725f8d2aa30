// Path: crates/networking/src/handshake.rs

//! Client handshake validation.
//!
//! A connecting client proves control of its account by signing
//! `{signer, timestamp, chainId}` bound to a protocol label. The handshake
//! is accepted only inside a 15-second window around the node's clock.

use mlayer_crypto::hash::eth_personal_digest;
use mlayer_crypto::sign::secp;
use mlayer_types::codec;
use mlayer_types::config::{VALID_HANDSHAKE_WINDOW, VALID_PROTOCOLS};
use mlayer_types::error::NetworkError;
use serde::{Deserialize, Serialize};

/// The handshake frame a client presents when connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClientHandshake {
    /// The network chain id the client believes it is talking to.
    #[serde(rename = "cId", default, skip_serializing_if = "String::is_empty")]
    pub chain_id: String,
    /// The protocol label the connection is bound to.
    #[serde(rename = "proId", default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    /// Hex SECP signature over the frame with this field cleared.
    #[serde(rename = "sig", default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    /// The signing account address.
    #[serde(rename = "sigr", default, skip_serializing_if = "String::is_empty")]
    pub signer: String,
    /// Client clock, milliseconds since epoch.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

impl ClientHandshake {
    fn signing_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        let mut unsigned = self.clone();
        unsigned.signature = String::new();
        codec::to_bytes_canonical(&unsigned)
            .map_err(|e| NetworkError::HandshakeRejected(e.to_string()))
    }

    /// Validates freshness, chain binding, protocol label and signature.
    /// `now_ms` is the node's clock; the window cutoff is inclusive.
    pub fn validate(&self, now_ms: u64, chain_id: &str) -> Result<(), NetworkError> {
        let skew = now_ms.abs_diff(self.timestamp);
        if skew > VALID_HANDSHAKE_WINDOW.as_millis() as u64 {
            return Err(NetworkError::HandshakeRejected("handshake expired".into()));
        }
        if self.chain_id != chain_id {
            return Err(NetworkError::HandshakeRejected("wrong chain id".into()));
        }
        if !VALID_PROTOCOLS.contains(&self.protocol.as_str()) {
            return Err(NetworkError::HandshakeRejected(format!(
                "unsupported protocol: {}",
                self.protocol
            )));
        }
        let digest = eth_personal_digest(&self.signing_bytes()?);
        let ok = secp::verify_by_address_hex(&self.signer, &digest, &self.signature)
            .map_err(|e| NetworkError::HandshakeRejected(e.to_string()))?;
        if !ok {
            return Err(NetworkError::HandshakeRejected(
                "invalid handshake signature".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlayer_crypto::sign::secp::SecpKeyPair;

    fn signed_handshake(key: &SecpKeyPair, timestamp: u64) -> ClientHandshake {
        let mut hs = ClientHandshake {
            chain_id: "mlayer-1".into(),
            protocol: "/mlayer/1.0.0".into(),
            signature: String::new(),
            signer: key.address(),
            timestamp,
        };
        let digest = eth_personal_digest(&hs.signing_bytes().unwrap());
        hs.signature = hex::encode(key.sign_prehash(&digest).unwrap());
        hs
    }

    #[test]
    fn accepts_a_fresh_signed_handshake() {
        let key = SecpKeyPair::generate();
        let hs = signed_handshake(&key, 1_000_000);
        assert!(hs.validate(1_000_500, "mlayer-1").is_ok());
    }

    #[test]
    fn window_cutoff_is_inclusive_at_fifteen_seconds() {
        let key = SecpKeyPair::generate();
        let hs = signed_handshake(&key, 1_000_000);
        // Exactly 15s of skew is accepted; one millisecond more is not.
        assert!(hs.validate(1_000_000 + 15_000, "mlayer-1").is_ok());
        assert!(hs.validate(1_000_000 + 15_001, "mlayer-1").is_err());
        // The window is symmetric: a client ahead of us is treated alike.
        assert!(hs.validate(1_000_000 - 15_000, "mlayer-1").is_ok());
        assert!(hs.validate(1_000_000 - 15_001, "mlayer-1").is_err());
    }

    #[test]
    fn rejects_wrong_chain_or_protocol() {
        let key = SecpKeyPair::generate();
        let hs = signed_handshake(&key, 1_000_000);
        assert!(hs.validate(1_000_000, "other-chain").is_err());

        let mut wrong_proto = hs.clone();
        wrong_proto.protocol = "/mlayer/9.9.9".into();
        // Signature no longer matters; the label check fires first.
        assert!(wrong_proto.validate(1_000_000, "mlayer-1").is_err());
    }

    #[test]
    fn rejects_a_forged_signer() {
        let key = SecpKeyPair::generate();
        let imposter = SecpKeyPair::generate();
        let mut hs = signed_handshake(&key, 1_000_000);
        hs.signer = imposter.address();
        assert!(hs.validate(1_000_000, "mlayer-1").is_err());
    }
}
