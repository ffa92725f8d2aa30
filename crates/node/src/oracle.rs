// Path: crates/node/src/oracle.rs

//! The chain oracle cache.
//!
//! The chain is the ground truth for identity and cadence: which keys hold
//! active validator licenses, and the current block/cycle/epoch. A refresh
//! worker polls the external chain client about once a second and updates a
//! read-mostly cache; the validator list itself is refetched only when the
//! on-chain license count changes. A failed refresh is logged and the stale
//! cache keeps serving.

use async_trait::async_trait;
use mlayer_storage::{StoreName, Stores, WriteBatch};
use mlayer_types::config::NodeConfig;
use mlayer_types::error::ChainError;
use mlayer_types::keys;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A snapshot of chain cadence and license totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainInfo {
    /// First block of the network.
    pub start_block: u64,
    /// Network start time, ms.
    pub start_time: u64,
    /// Current block number.
    pub current_block: u64,
    /// Current cycle.
    pub current_cycle: u64,
    /// Current epoch.
    pub current_epoch: u64,
    /// Count of active validator licenses.
    pub validator_active_license_count: u64,
    /// Count of active sentry licenses.
    pub sentry_active_license_count: u64,
}

/// One validator operator as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorOperator {
    /// Compressed SECP public key, hex.
    pub public_key_secp: String,
    /// Ed25519 public key, hex.
    pub edd_key: String,
    /// License owner address.
    pub license_owner: String,
}

/// The external chain client. Production wires an RPC implementation; tests
/// inject a mock.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetches the current chain snapshot.
    async fn get_chain_info(&self) -> Result<ChainInfo, ChainError>;
    /// Pages through the validator operator set.
    async fn get_validator_node_operators(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Vec<ValidatorOperator>, ChainError>;
    /// Resolves the sentry license owner of a SECP key, if licensed.
    async fn get_sentry_license_owner(
        &self,
        public_key_secp: &str,
    ) -> Result<Option<String>, ChainError>;
}

const VALIDATOR_PAGE_SIZE: u64 = 100;

/// The read-mostly cache the pipeline consults.
pub struct ChainCache {
    validators: RwLock<HashMap<String, String>>,
    info: RwLock<ChainInfo>,
    active_validator_licenses: AtomicU64,
    synced: AtomicBool,
}

impl Default for ChainCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainCache {
    /// An empty, unsynced cache.
    pub fn new() -> Self {
        Self {
            validators: RwLock::new(HashMap::new()),
            info: RwLock::new(ChainInfo::default()),
            active_validator_licenses: AtomicU64::new(0),
            synced: AtomicBool::new(false),
        }
    }

    /// True once at least one refresh has succeeded.
    pub fn synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// True when the Ed25519 key belongs to a licensed validator.
    pub fn is_validator(&self, edd_pubkey: &str) -> bool {
        self.validators
            .read()
            .map(|m| m.contains_key(&keys::edd_addr_key(edd_pubkey)))
            .unwrap_or(false)
    }

    /// Resolves one of the mapping keys (`secp/<pk>/edd`, `edd/<pk>/addr`,
    /// ...).
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.validators.read().ok()?.get(key).cloned()
    }

    /// The license-owner address of a validator Ed25519 key.
    pub fn validator_address(&self, edd_pubkey: &str) -> Option<String> {
        self.resolve(&keys::edd_addr_key(edd_pubkey))
    }

    /// Current cycle.
    pub fn current_cycle(&self) -> u64 {
        self.info.read().map(|i| i.current_cycle).unwrap_or(0)
    }

    /// Current block number.
    pub fn current_block(&self) -> u64 {
        self.info.read().map(|i| i.current_block).unwrap_or(0)
    }

    /// Current epoch.
    pub fn current_epoch(&self) -> u64 {
        self.info.read().map(|i| i.current_epoch).unwrap_or(0)
    }

    /// The latest chain snapshot.
    pub fn info(&self) -> ChainInfo {
        self.info.read().map(|i| i.clone()).unwrap_or_default()
    }

    /// Installs a validator's key mappings directly. Test seam; the refresh
    /// worker uses the same writes.
    pub fn insert_validator(&self, operator: &ValidatorOperator) {
        if let Ok(mut map) = self.validators.write() {
            Self::insert_operator(&mut map, operator);
        }
    }

    fn insert_operator(map: &mut HashMap<String, String>, operator: &ValidatorOperator) {
        map.insert(operator.license_owner.clone(), "true".into());
        map.insert(
            keys::secp_edd_key(&operator.public_key_secp),
            operator.edd_key.clone(),
        );
        map.insert(
            keys::secp_addr_key(&operator.public_key_secp),
            operator.license_owner.clone(),
        );
        map.insert(
            keys::edd_secp_key(&operator.edd_key),
            operator.public_key_secp.clone(),
        );
        map.insert(
            keys::edd_addr_key(&operator.edd_key),
            operator.license_owner.clone(),
        );
    }

    /// Marks the cache synced; test seam.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    /// Sets the chain snapshot directly; test seam.
    pub fn set_info(&self, info: ChainInfo) {
        if let Ok(mut guard) = self.info.write() {
            *guard = info;
        }
    }

    /// One refresh pass: pull the snapshot, refetch the validator pages only
    /// when the license count moved, and mirror the mappings into the
    /// `chainCache` store for cold starts.
    pub async fn refresh(
        &self,
        client: &dyn ChainClient,
        stores: Option<&Stores>,
    ) -> Result<(), ChainError> {
        let info = client.get_chain_info().await?;

        let known = self.active_validator_licenses.load(Ordering::Acquire);
        if known != info.validator_active_license_count {
            let mut fresh: HashMap<String, String> = HashMap::new();
            let mut page = 1u64;
            loop {
                let operators = client
                    .get_validator_node_operators(page, VALIDATOR_PAGE_SIZE)
                    .await?;
                for op in &operators {
                    Self::insert_operator(&mut fresh, op);
                }
                if operators.is_empty() || (operators.len() as u64) < VALIDATOR_PAGE_SIZE {
                    break;
                }
                page += 1;
            }

            if let Some(stores) = stores {
                let mut batch = WriteBatch::default();
                for (k, v) in &fresh {
                    batch.put(StoreName::ChainCache, format!("/{k}"), v.clone().into_bytes());
                }
                if let Err(e) = stores.commit(batch) {
                    tracing::warn!(target: "oracle", error = %e, "chain cache mirror failed");
                }
            }

            if let Ok(mut map) = self.validators.write() {
                *map = fresh;
            }
            self.active_validator_licenses
                .store(info.validator_active_license_count, Ordering::Release);
        }

        if let Ok(mut guard) = self.info.write() {
            *guard = info;
        }
        self.synced.store(true, Ordering::Release);
        Ok(())
    }
}

/// Spawns the refresh worker. It ticks at the configured interval, bounds
/// each pass with the refresh timeout, and never tears the cache down on
/// failure.
pub fn spawn_refresh_worker(
    cache: Arc<ChainCache>,
    client: Arc<dyn ChainClient>,
    stores: Stores,
    config: Arc<NodeConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.chain_refresh_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => if *shutdown.borrow() { break; },
                _ = ticker.tick() => {
                    let pass = cache.refresh(client.as_ref(), Some(&stores));
                    match tokio::time::timeout(config.chain_refresh_timeout, pass).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(target: "oracle", error = %e, "chain refresh failed; serving stale cache");
                        }
                        Err(_) => {
                            tracing::warn!(target: "oracle", "chain refresh timed out; serving stale cache");
                        }
                    }
                }
            }
        }
    })
}
