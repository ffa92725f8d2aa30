// Path: crates/cli/src/chain_client.rs

//! A file-backed chain client for development networks.
//!
//! The oracle contract only needs a snapshot of the validator set and the
//! cadence counters; on dev networks these come from
//! `<dataDir>/chain.json`, re-read on every refresh so operators can edit
//! the set of a running node. Production deployments substitute an
//! RPC-backed client behind the same trait.

use async_trait::async_trait;
use mlayer_node::oracle::{ChainClient, ChainInfo, ValidatorOperator};
use mlayer_types::error::ChainError;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Default)]
struct ChainFile {
    #[serde(default)]
    start_block: u64,
    #[serde(default)]
    start_time: u64,
    #[serde(default)]
    current_block: u64,
    #[serde(default)]
    current_cycle: u64,
    #[serde(default)]
    current_epoch: u64,
    #[serde(default)]
    sentry_active_license_count: u64,
    #[serde(default)]
    validators: Vec<ChainFileValidator>,
}

#[derive(Deserialize)]
struct ChainFileValidator {
    public_key_secp: String,
    edd_key: String,
    license_owner: String,
}

/// Chain oracle backed by a JSON file.
pub struct FileChainClient {
    path: PathBuf,
}

impl FileChainClient {
    /// Points the client at a chain snapshot file.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Result<ChainFile, ChainError> {
        let raw = std::fs::read(&self.path)
            .map_err(|e| ChainError::Unavailable(format!("{}: {e}", self.path.display())))?;
        serde_json::from_slice(&raw).map_err(|e| ChainError::BadData(e.to_string()))
    }
}

#[async_trait]
impl ChainClient for FileChainClient {
    async fn get_chain_info(&self) -> Result<ChainInfo, ChainError> {
        let file = self.read()?;
        Ok(ChainInfo {
            start_block: file.start_block,
            start_time: file.start_time,
            current_block: file.current_block,
            current_cycle: file.current_cycle,
            current_epoch: file.current_epoch,
            validator_active_license_count: file.validators.len() as u64,
            sentry_active_license_count: file.sentry_active_license_count,
        })
    }

    async fn get_validator_node_operators(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Vec<ValidatorOperator>, ChainError> {
        let file = self.read()?;
        let start = ((page.saturating_sub(1)) * per_page) as usize;
        Ok(file
            .validators
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .map(|v| ValidatorOperator {
                public_key_secp: v.public_key_secp,
                edd_key: v.edd_key,
                license_owner: v.license_owner,
            })
            .collect())
    }

    async fn get_sentry_license_owner(
        &self,
        _public_key_secp: &str,
    ) -> Result<Option<String>, ChainError> {
        Ok(None)
    }
}
