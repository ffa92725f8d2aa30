// Path: crates/types/src/entities/wallet.rs

use super::{EntityData, EntityModel, EventPath};
use crate::codec;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// A wallet linked to an account, replicated so peers can resolve cross-chain
/// signer addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Wallet {
    /// Owning account (DID).
    #[serde(rename = "acct", default, skip_serializing_if = "String::is_empty")]
    pub account: String,
    /// Wallet address on its home chain.
    #[serde(rename = "addr", default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// Chain block number at the winning event.
    #[serde(rename = "blk", default)]
    pub block_number: u64,
    /// Chain cycle at the winning event.
    #[serde(rename = "cy", default)]
    pub cycle: u64,
    /// Back-pointer to the winning event.
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventPath>,
    /// Chain epoch at the winning event.
    #[serde(rename = "ep", default)]
    pub epoch: u64,
    /// State-content hash of this row.
    #[serde(rename = "h", default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    /// Stable entity id.
    #[serde(rename = "id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Timestamp of the winning write, milliseconds.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

impl Wallet {
    fn identity_view(&self) -> Self {
        let mut v = self.clone();
        v.id = String::new();
        v.event = None;
        v.hash = String::new();
        v.timestamp = 0;
        v.block_number = 0;
        v.cycle = 0;
        v.epoch = 0;
        v
    }
}

impl EntityData for Wallet {
    fn model(&self) -> EntityModel {
        EntityModel::Wallet
    }

    fn derive_id(&self) -> Result<String, CodecError> {
        codec::canonical_hash_hex(&self.identity_view())
    }

    fn canonical_hash(&self) -> Result<String, CodecError> {
        let mut v = self.clone();
        v.hash = String::new();
        v.event = None;
        codec::canonical_hash_hex(&v)
    }
}
