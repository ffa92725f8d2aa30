// Path: crates/cli/src/commands/license.rs

//! License registration data.
//!
//! Registration submits five hex fields joined by the literal separator
//! `3A5C`: the SECP public key, the timestamp as a uint256, a commitment
//! over `{chainId, timestamp, pubKeyEDD}` signed by the SECP key, the
//! Ed25519 public key, and that signature.

use super::{load_key, CliError};
use clap::Subcommand;
use mlayer_crypto::hash::keccak256;
use mlayer_crypto::sign::ed25519::Ed25519KeyPair;
use mlayer_crypto::sign::secp::SecpKeyPair;
use mlayer_storage::{StoreName, Stores};
use mlayer_types::codec;
use mlayer_types::config::NodeConfig;
use mlayer_types::keys;
use serde::Serialize;
use std::path::Path;

const SEPARATOR: &str = "3A5C";

/// `mlayer node license ...` subcommands.
#[derive(Subcommand)]
pub enum LicenseCommand {
    /// Print the on-chain registration data for this node's keys.
    Register,
    /// Show license ownership known from the mirrored chain cache.
    List,
}

#[derive(Serialize)]
struct RegistrationCommitment<'a> {
    #[serde(rename = "cId")]
    chain_id: &'a str,
    #[serde(rename = "pubK", with = "serde_bytes")]
    pub_key_edd: &'a [u8],
    #[serde(rename = "ts")]
    timestamp: u64,
}

fn uint256_be(v: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&v.to_be_bytes());
    out
}

/// Builds the registration string from the two key pairs.
pub fn registration_data(
    chain_id: &str,
    timestamp: u64,
    secp: &SecpKeyPair,
    edd: &Ed25519KeyPair,
) -> Result<String, CliError> {
    let edd_pub = edd.public_key();
    let commitment_bytes = codec::to_bytes_canonical(&RegistrationCommitment {
        chain_id,
        pub_key_edd: &edd_pub,
        timestamp,
    })
    .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?;
    let commitment = keccak256(&commitment_bytes);
    let signature = secp
        .sign_prehash(&commitment)
        .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?;

    Ok([
        hex::encode(secp.public_key()),
        hex::encode(uint256_be(timestamp)),
        hex::encode(commitment),
        hex::encode(edd_pub),
        hex::encode(signature),
    ]
    .join(SEPARATOR))
}

/// `mlayer node license register|list`.
pub fn run(command: LicenseCommand, config: &NodeConfig, dir: &Path) -> Result<(), CliError> {
    match command {
        LicenseCommand::Register => {
            let secp_bytes = load_key(dir, "account")?;
            let secp =
                SecpKeyPair::from_bytes(&secp_bytes).map_err(|e| CliError::User(e.to_string()))?;
            let edd = node_keypair(config)?;
            let timestamp = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            let data = registration_data(&config.chain_id, timestamp, &secp, &edd)?;
            println!("------------------");
            println!("Registration Data");
            println!("------------------");
            println!("{data}");
            Ok(())
        }
        LicenseCommand::List => {
            let secp_bytes = load_key(dir, "account")?;
            let secp =
                SecpKeyPair::from_bytes(&secp_bytes).map_err(|e| CliError::User(e.to_string()))?;
            let stores = Stores::open(config.store_dir().join("node.redb"))
                .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?;
            let owner_key = format!("/{}", keys::secp_addr_key(&secp.public_key_hex()));
            match stores
                .get(StoreName::ChainCache, &owner_key)
                .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?
            {
                Some(owner) => {
                    println!(
                        "validator license: owner {}",
                        String::from_utf8_lossy(&owner)
                    );
                }
                None => println!("no license known for {}", secp.address()),
            }
            Ok(())
        }
    }
}

fn node_keypair(config: &NodeConfig) -> Result<Ed25519KeyPair, CliError> {
    if config.private_key_edd.is_empty() {
        return Err(CliError::User(
            "node Ed25519 key missing: set private_key_edd in the config".into(),
        ));
    }
    Ed25519KeyPair::from_hex(&config.private_key_edd).map_err(|e| CliError::User(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_data_has_five_fields_and_fixed_separator() {
        let secp = SecpKeyPair::generate();
        let edd = Ed25519KeyPair::generate();
        let data = registration_data("mlayer-1", 1_700_000_000_000, &secp, &edd).unwrap();
        let fields: Vec<&str> = data.split(SEPARATOR).collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], hex::encode(secp.public_key()));
        // uint256 timestamp: 64 hex chars.
        assert_eq!(fields[1].len(), 64);
        assert_eq!(fields[3], edd.public_key_hex());
        // 65-byte recoverable signature.
        assert_eq!(fields[4].len(), 130);
    }

    #[test]
    fn commitment_binds_chain_and_keys() {
        let secp = SecpKeyPair::generate();
        let edd = Ed25519KeyPair::generate();
        let a = registration_data("mlayer-1", 1000, &secp, &edd).unwrap();
        let b = registration_data("mlayer-2", 1000, &secp, &edd).unwrap();
        assert_ne!(a, b);
    }
}
