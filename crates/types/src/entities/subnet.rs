// Path: crates/types/src/entities/subnet.rs

use super::{EntityData, EntityModel, EventPath};
use crate::codec;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// An administrative namespace grouping topics, subscriptions and messages,
/// owned by an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Subnet {
    /// Owner account (DID).
    #[serde(rename = "acct", default, skip_serializing_if = "String::is_empty")]
    pub account: String,
    /// Acting agent device key, when written through one.
    #[serde(rename = "agt", default, skip_serializing_if = "String::is_empty")]
    pub agent: String,
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
    /// Human-readable reference: at most 64 characters, alphanumerics and
    /// dots only.
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
    /// Status flag; non-zero means enabled.
    #[serde(rename = "st", default)]
    pub status: u8,
    /// Timestamp of the winning write, milliseconds.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

impl Subnet {
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

impl EntityData for Subnet {
    fn model(&self) -> EntityModel {
        EntityModel::Subnet
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_across_volatile_fields() {
        let base = Subnet {
            account: "did:0xab".into(),
            reference: "acme.chat".into(),
            status: 1,
            ..Default::default()
        };
        let mut later = base.clone();
        later.timestamp = 99;
        later.block_number = 4;
        later.event = Some(EventPath::new("vv", EntityModel::Subnet, "ee"));
        assert_eq!(base.derive_id().unwrap(), later.derive_id().unwrap());
    }

    #[test]
    fn hash_tracks_content() {
        let base = Subnet {
            account: "did:0xab".into(),
            reference: "acme.chat".into(),
            ..Default::default()
        };
        let mut renamed = base.clone();
        renamed.reference = "acme.mail".into();
        assert_ne!(
            base.canonical_hash().unwrap(),
            renamed.canonical_hash().unwrap()
        );
    }
}
