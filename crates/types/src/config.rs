// Path: crates/types/src/config.rs

//! Node configuration.
//!
//! All workers receive an explicit `NodeConfig` (usually via the node
//! context) instead of consulting process globals, so tests can inject a
//! fully synthetic configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The protocol labels this node accepts in client handshakes.
pub const VALID_PROTOCOLS: &[&str] = &["/mlayer/1.0.0"];

/// The time window within which a client handshake is accepted.
pub const VALID_HANDSHAKE_WINDOW: Duration = Duration::from_secs(15);

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Network chain id, e.g. "84532".
    pub chain_id: String,
    /// Data directory; stores and keystores live beneath it.
    pub data_dir: PathBuf,
    /// Whether this node holds a validator license.
    pub validator: bool,
    /// Hex Ed25519 private key seed (network identity / event signing).
    pub private_key_edd: String,
    /// Hex Ed25519 public key.
    pub public_key_edd: String,
    /// Hex SECP256k1 private key (license identity).
    pub private_key_secp: String,
    /// Hex compressed SECP256k1 public key.
    pub public_key_secp: String,
    /// License-owner address, filled from the chain oracle.
    pub owner_address: String,
    /// libp2p listen multiaddr.
    pub listen_addr: String,
    /// Bootstrap peers to dial at startup.
    pub dial_addrs: Vec<String>,
    /// RPC bind host.
    pub rpc_host: String,
    /// RPC bind port.
    pub rpc_port: u16,
    /// WebSocket bind address.
    pub ws_address: String,
    /// REST bind address.
    pub rest_address: String,
    /// Capacity of the ingress event channel.
    pub ingress_capacity: usize,
    /// Upper bound on a message body, bytes.
    pub max_message_body_bytes: usize,
    /// Peer point-to-point request timeout.
    #[serde(with = "duration_ms")]
    pub peer_request_timeout: Duration,
    /// Chain oracle refresh timeout.
    #[serde(with = "duration_ms")]
    pub chain_refresh_timeout: Duration,
    /// Interval between chain oracle refreshes.
    #[serde(with = "duration_ms")]
    pub chain_refresh_interval: Duration,
    /// Base backoff for sync retries, doubled per attempt and jittered ±25%.
    #[serde(with = "duration_ms")]
    pub sync_backoff_base: Duration,
    /// Test mode: invariant violations panic instead of being quarantined.
    pub test_mode: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: "mlayer-1".into(),
            data_dir: PathBuf::from("./data"),
            validator: false,
            private_key_edd: String::new(),
            public_key_edd: String::new(),
            private_key_secp: String::new(),
            public_key_secp: String::new(),
            owner_address: String::new(),
            listen_addr: "/ip4/0.0.0.0/tcp/9530".into(),
            dial_addrs: Vec::new(),
            rpc_host: "127.0.0.1".into(),
            rpc_port: 9525,
            ws_address: "0.0.0.0:8088".into(),
            rest_address: "0.0.0.0:9531".into(),
            ingress_capacity: 4096,
            max_message_body_bytes: 64 * 1024,
            peer_request_timeout: Duration::from_secs(5),
            chain_refresh_timeout: Duration::from_secs(10),
            chain_refresh_interval: Duration::from_secs(1),
            sync_backoff_base: Duration::from_millis(200),
            test_mode: false,
        }
    }
}

impl NodeConfig {
    /// Loads a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, crate::error::AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AppError::BadRequest(format!("config read: {e}")))?;
        toml::from_str(&raw)
            .map_err(|e| crate::error::AppError::BadRequest(format!("config parse: {e}")))
    }

    /// The keystore directory, `<dataDir>/keystores/.goml`.
    pub fn keystore_dir(&self) -> PathBuf {
        self.data_dir.join("keystores").join(".goml")
    }

    /// Path of a named keystore file.
    pub fn keystore_path(&self, name: &str) -> PathBuf {
        self.keystore_dir().join(format!("{name}.json"))
    }

    /// The datastore directory.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.peer_request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.chain_refresh_timeout, Duration::from_secs(10));
        assert_eq!(cfg.sync_backoff_base, Duration::from_millis(200));
        assert_eq!(VALID_HANDSHAKE_WINDOW, Duration::from_secs(15));
        assert!(VALID_PROTOCOLS.contains(&"/mlayer/1.0.0"));
    }

    #[test]
    fn keystore_path_is_under_goml() {
        let cfg = NodeConfig {
            data_dir: PathBuf::from("/tmp/ml"),
            ..Default::default()
        };
        assert_eq!(
            cfg.keystore_path("account"),
            PathBuf::from("/tmp/ml/keystores/.goml/account.json")
        );
    }
}
