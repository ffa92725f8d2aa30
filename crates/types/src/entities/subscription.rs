// Path: crates/types/src/entities/subscription.rs

use super::{EntityData, EntityModel, EventPath, Privilege};
use crate::codec;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// A subscriber's membership state on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum SubscriptionStatus {
    /// Requested, awaiting approval on invite-only topics.
    #[default]
    Pending,
    /// Active membership.
    Approved,
    /// Banned by the topic owner.
    Banned,
    /// Left voluntarily.
    Left,
}

impl From<SubscriptionStatus> for u8 {
    fn from(s: SubscriptionStatus) -> u8 {
        match s {
            SubscriptionStatus::Pending => 1,
            SubscriptionStatus::Approved => 2,
            SubscriptionStatus::Banned => 3,
            SubscriptionStatus::Left => 4,
        }
    }
}

impl TryFrom<u8> for SubscriptionStatus {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(SubscriptionStatus::Pending),
            2 => Ok(SubscriptionStatus::Approved),
            3 => Ok(SubscriptionStatus::Banned),
            4 => Ok(SubscriptionStatus::Left),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// A subscription binding a subscriber account to a topic. Identity is
/// `(topic, subscriber)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Subscription {
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
    /// The member's privilege on the topic.
    #[serde(rename = "rol", default)]
    pub role: Privilege,
    /// The subnet the topic belongs to.
    #[serde(rename = "snet", default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,
    /// Membership status.
    #[serde(rename = "st", default)]
    pub status: SubscriptionStatus,
    /// Subscriber account (DID).
    #[serde(rename = "sub", default, skip_serializing_if = "String::is_empty")]
    pub subscriber: String,
    /// The topic subscribed to.
    #[serde(rename = "topId", default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// Timestamp of the winning write, milliseconds.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

#[derive(Serialize)]
struct SubscriptionIdentity<'a> {
    #[serde(rename = "sub")]
    subscriber: &'a str,
    #[serde(rename = "topId")]
    topic: &'a str,
}

impl EntityData for Subscription {
    fn model(&self) -> EntityModel {
        EntityModel::Subscription
    }

    fn derive_id(&self) -> Result<String, CodecError> {
        codec::canonical_hash_hex(&SubscriptionIdentity {
            subscriber: &self.subscriber,
            topic: &self.topic,
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
    fn identity_is_topic_and_subscriber() {
        let a = Subscription {
            topic: "t1".into(),
            subscriber: "did:0xab".into(),
            role: Privilege::Read,
            ..Default::default()
        };
        let mut upgraded = a.clone();
        upgraded.role = Privilege::Write;
        upgraded.status = SubscriptionStatus::Approved;
        assert_eq!(a.derive_id().unwrap(), upgraded.derive_id().unwrap());

        let mut other = a.clone();
        other.subscriber = "did:0xcd".into();
        assert_ne!(a.derive_id().unwrap(), other.derive_id().unwrap());
    }
}
