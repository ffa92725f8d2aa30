// Path: crates/types/src/entities/topic.rs

use super::{EntityData, EntityModel, EventPath};
use crate::codec;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// A pub/sub channel inside a subnet. Identity is `(subnet, handle)`, which
/// is what enforces handle uniqueness per subnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Topic {
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
    /// Topic handle, unique within the subnet.
    #[serde(rename = "hand", default, skip_serializing_if = "String::is_empty")]
    pub handle: String,
    /// Stable entity id.
    #[serde(rename = "id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Invite-only topics require a grant from the owner to subscribe.
    #[serde(rename = "invO", default, skip_serializing_if = "std::ops::Not::not")]
    pub invite_only: bool,
    /// Owner account (DID).
    #[serde(rename = "own", default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    /// Parent topic id, for threaded topics.
    #[serde(rename = "pTH", default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    /// Read-only topics reject messages from non-owners.
    #[serde(rename = "rO", default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    /// The subnet this topic belongs to.
    #[serde(rename = "snet", default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,
    /// Timestamp of the winning write, milliseconds.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

#[derive(Serialize)]
struct TopicIdentity<'a> {
    #[serde(rename = "hand")]
    handle: &'a str,
    #[serde(rename = "snet")]
    subnet: &'a str,
}

impl EntityData for Topic {
    fn model(&self) -> EntityModel {
        EntityModel::Topic
    }

    fn derive_id(&self) -> Result<String, CodecError> {
        codec::canonical_hash_hex(&TopicIdentity {
            handle: &self.handle,
            subnet: &self.subnet,
        })
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
    fn same_handle_same_subnet_collides() {
        let a = Topic {
            subnet: "s1".into(),
            handle: "general".into(),
            owner: "did:0xab".into(),
            ..Default::default()
        };
        let b = Topic {
            subnet: "s1".into(),
            handle: "general".into(),
            owner: "did:0xcd".into(),
            invite_only: true,
            ..Default::default()
        };
        assert_eq!(a.derive_id().unwrap(), b.derive_id().unwrap());

        let other_subnet = Topic {
            subnet: "s2".into(),
            handle: "general".into(),
            ..Default::default()
        };
        assert_ne!(a.derive_id().unwrap(), other_subnet.derive_id().unwrap());
    }
}
