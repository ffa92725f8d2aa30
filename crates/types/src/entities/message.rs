// Path: crates/types/src/entities/message.rs

use super::{EntityData, EntityModel, EventPath};
use crate::codec;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// A message sent to a topic. The body travels out of band; the event
/// carries only its hash and attachment references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Message {
    /// Attachment CIDs or URLs.
    #[serde(rename = "atts", default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Chain block number at the winning event.
    #[serde(rename = "blk", default)]
    pub block_number: u64,
    /// Chain cycle at the winning event.
    #[serde(rename = "cy", default)]
    pub cycle: u64,
    /// Hash of the message body.
    #[serde(rename = "dH", default, skip_serializing_if = "String::is_empty")]
    pub data_hash: String,
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
    /// Sender account (DID).
    #[serde(rename = "s", default, skip_serializing_if = "String::is_empty")]
    pub sender: String,
    /// The subnet the topic belongs to.
    #[serde(rename = "snet", default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,
    /// The target topic.
    #[serde(rename = "topId", default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// Timestamp, milliseconds.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

impl Message {
    fn identity_view(&self) -> Self {
        let mut v = self.clone();
        v.id = String::new();
        v.event = None;
        v.hash = String::new();
        v.block_number = 0;
        v.cycle = 0;
        v.epoch = 0;
        v
    }
}

impl EntityData for Message {
    fn model(&self) -> EntityModel {
        EntityModel::Message
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
    fn distinct_messages_get_distinct_ids() {
        let a = Message {
            topic: "t1".into(),
            sender: "did:0xab".into(),
            data_hash: "aa".into(),
            timestamp: 1000,
            ..Default::default()
        };
        let mut b = a.clone();
        b.data_hash = "bb".into();
        assert_ne!(a.derive_id().unwrap(), b.derive_id().unwrap());
        // Identical content at an identical timestamp is the same message.
        assert_eq!(a.derive_id().unwrap(), a.clone().derive_id().unwrap());
    }
}
