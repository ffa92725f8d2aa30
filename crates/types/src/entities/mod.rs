// Path: crates/types/src/entities/mod.rs

//! The replicated entity model.
//!
//! Field tags follow the fixed key map of the wire protocol (`pld`, `sig`,
//! `ts`, `snet`, ...). Struct fields are declared in sorted tag order so the
//! canonical encoder emits them deterministically; empty and null fields are
//! omitted from the encoding entirely.

mod authorization;
mod message;
mod subnet;
mod subscription;
mod topic;
mod wallet;

pub use authorization::Authorization;
pub use message::Message;
pub use subnet::Subnet;
pub use subscription::{Subscription, SubscriptionStatus};
pub use topic::Topic;
pub use wallet::Wallet;

use crate::codec;
use crate::error::{AppError, CodecError};
use serde::{Deserialize, Serialize};

/// Maximum length of a subnet `ref`.
pub const MAX_SUBNET_REF_LEN: usize = 64;

/// The entity-type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityModel {
    /// An administrative namespace grouping topics, subscriptions, messages.
    Subnet,
    /// A grant from an account to an agent device key.
    #[serde(rename = "auth")]
    Authorization,
    /// A pub/sub channel inside a subnet.
    Topic,
    /// A subscriber's membership of a topic.
    Subscription,
    /// A message sent to a topic.
    Message,
    /// A linked account wallet.
    Wallet,
}

impl EntityModel {
    /// All models, in gossip-subscription order.
    pub const ALL: [EntityModel; 6] = [
        EntityModel::Subnet,
        EntityModel::Authorization,
        EntityModel::Topic,
        EntityModel::Subscription,
        EntityModel::Wallet,
        EntityModel::Message,
    ];

    /// The short model name used in keys and topic names.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityModel::Subnet => "subnet",
            EntityModel::Authorization => "auth",
            EntityModel::Topic => "topic",
            EntityModel::Subscription => "subscription",
            EntityModel::Message => "message",
            EntityModel::Wallet => "wallet",
        }
    }

    /// The gossipsub topic carrying events of this model.
    pub fn pubsub_topic(&self) -> String {
        format!("mlayer.{}", self.as_str())
    }
}

impl std::fmt::Display for EntityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityModel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subnet" => Ok(EntityModel::Subnet),
            "auth" => Ok(EntityModel::Authorization),
            "topic" => Ok(EntityModel::Topic),
            "subscription" => Ok(EntityModel::Subscription),
            "message" => Ok(EntityModel::Message),
            "wallet" => Ok(EntityModel::Wallet),
            other => Err(AppError::BadRequest(format!("unknown model: {other}"))),
        }
    }
}

/// The event kind: what the payload does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "u16", try_from = "u16")]
pub enum EventKind {
    /// Creates a new entity.
    #[default]
    Create,
    /// Updates an existing entity.
    Update,
    /// Deletes (tombstones) an entity.
    Delete,
}

impl From<EventKind> for u16 {
    fn from(k: EventKind) -> u16 {
        match k {
            EventKind::Create => 1,
            EventKind::Update => 2,
            EventKind::Delete => 3,
        }
    }
}

impl TryFrom<u16> for EventKind {
    type Error = String;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(EventKind::Create),
            2 => Ok(EventKind::Update),
            3 => Ok(EventKind::Delete),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Privilege levels of an authorization grant, ordered from weakest to
/// strongest so `>=` comparisons express "at least".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Privilege {
    /// May read from the scoped subnet.
    #[default]
    Read,
    /// May write (send messages, subscribe).
    Write,
    /// Full administrative control.
    Admin,
}

impl From<Privilege> for u8 {
    fn from(p: Privilege) -> u8 {
        match p {
            Privilege::Read => 1,
            Privilege::Write => 2,
            Privilege::Admin => 3,
        }
    }
}

impl TryFrom<u8> for Privilege {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Privilege::Read),
            2 => Ok(Privilege::Write),
            3 => Ok(Privilege::Admin),
            other => Err(format!("unknown privilege: {other}")),
        }
    }
}

/// Signature scheme of a client payload signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SignatureType {
    /// Ethereum-style SECP256k1 over a personal-message prefix.
    #[default]
    #[serde(rename = "eth")]
    EthereumSecp,
    /// Tendermint Amino (ADR-036) SECP256k1.
    #[serde(rename = "tm")]
    TendermintSecp,
    /// Raw Ed25519 (device/agent keys).
    #[serde(rename = "edd")]
    Ed25519,
}

/// A client signature together with its scheme and, for cross-chain wallets,
/// the signer's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SignatureData {
    /// Signer public key (base64 for Amino, hex otherwise); empty when the
    /// address alone identifies the signer.
    #[serde(rename = "pubK", default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,
    /// The signature bytes, hex-encoded (base64 for Amino).
    #[serde(rename = "sig", default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    /// The signature scheme.
    #[serde(rename = "ty", default)]
    pub sig_type: SignatureType,
}

/// A reference to an event by `{validator, model, id}`. Events point at
/// previous events by id, never by ownership, so dangling references are
/// resolved lazily by sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPath {
    /// The referenced event id (hex hash).
    #[serde(rename = "id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// The entity model of the referenced event.
    #[serde(rename = "m")]
    pub model: EntityModel,
    /// The Ed25519 public key of the validator that produced it.
    #[serde(rename = "v", default, skip_serializing_if = "String::is_empty")]
    pub validator: String,
}

impl EventPath {
    /// Builds a path reference.
    pub fn new(validator: impl Into<String>, model: EntityModel, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model,
            validator: validator.into(),
        }
    }

    /// The `/`-separated key form used in point-to-point fetches.
    pub fn key(&self) -> String {
        format!("/{}/{}/{}", self.validator, self.model, self.id)
    }
}

/// The entity payload carried by a client request, one of the six models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadData {
    /// Subnet create/update.
    #[serde(rename = "subnet")]
    Subnet(Subnet),
    /// Authorization grant.
    #[serde(rename = "auth")]
    Authorization(Authorization),
    /// Topic create/update.
    #[serde(rename = "topic")]
    Topic(Topic),
    /// Subscription change.
    #[serde(rename = "subscription")]
    Subscription(Subscription),
    /// Message send.
    #[serde(rename = "message")]
    Message(Message),
    /// Wallet link.
    #[serde(rename = "wallet")]
    Wallet(Wallet),
}

impl PayloadData {
    /// The entity-type discriminant of this payload.
    pub fn model(&self) -> EntityModel {
        match self {
            PayloadData::Subnet(_) => EntityModel::Subnet,
            PayloadData::Authorization(_) => EntityModel::Authorization,
            PayloadData::Topic(_) => EntityModel::Topic,
            PayloadData::Subscription(_) => EntityModel::Subscription,
            PayloadData::Message(_) => EntityModel::Message,
            PayloadData::Wallet(_) => EntityModel::Wallet,
        }
    }

    /// Canonical bytes of the inner entity value — the form state rows are
    /// stored in (no enum wrapper).
    pub fn to_state_bytes(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            PayloadData::Subnet(s) => codec::to_bytes_canonical(s),
            PayloadData::Authorization(a) => codec::to_bytes_canonical(a),
            PayloadData::Topic(t) => codec::to_bytes_canonical(t),
            PayloadData::Subscription(s) => codec::to_bytes_canonical(s),
            PayloadData::Message(m) => codec::to_bytes_canonical(m),
            PayloadData::Wallet(w) => codec::to_bytes_canonical(w),
        }
    }

    /// The stable entity id, deriving it when the payload carries none.
    pub fn entity_id(&self) -> Result<String, CodecError> {
        let explicit = match self {
            PayloadData::Subnet(s) => &s.id,
            PayloadData::Authorization(a) => &a.id,
            PayloadData::Topic(t) => &t.id,
            PayloadData::Subscription(s) => &s.id,
            PayloadData::Message(m) => &m.id,
            PayloadData::Wallet(w) => &w.id,
        };
        if !explicit.is_empty() {
            return Ok(explicit.clone());
        }
        self.derive_id()
    }
}

impl EntityData for PayloadData {
    fn model(&self) -> EntityModel {
        PayloadData::model(self)
    }

    fn derive_id(&self) -> Result<String, CodecError> {
        match self {
            PayloadData::Subnet(s) => s.derive_id(),
            PayloadData::Authorization(a) => a.derive_id(),
            PayloadData::Topic(t) => t.derive_id(),
            PayloadData::Subscription(s) => s.derive_id(),
            PayloadData::Message(m) => m.derive_id(),
            PayloadData::Wallet(w) => w.derive_id(),
        }
    }

    fn canonical_hash(&self) -> Result<String, CodecError> {
        match self {
            PayloadData::Subnet(s) => s.canonical_hash(),
            PayloadData::Authorization(a) => a.canonical_hash(),
            PayloadData::Topic(t) => t.canonical_hash(),
            PayloadData::Subscription(s) => s.canonical_hash(),
            PayloadData::Message(m) => m.canonical_hash(),
            PayloadData::Wallet(w) => w.canonical_hash(),
        }
    }
}

/// Identity and hashing behavior shared by every entity type.
pub trait EntityData {
    /// The entity-type discriminant.
    fn model(&self) -> EntityModel;
    /// Derives the stable entity id from the identity fields (I1).
    fn derive_id(&self) -> Result<String, CodecError>;
    /// Keccak-256 over the canonical encoding with volatile fields cleared;
    /// this is the `hash` stored on current-state rows (I4).
    fn canonical_hash(&self) -> Result<String, CodecError>;
}

/// The model-independent head of a current-state row: every entity encodes
/// its back-pointer, content hash and winning timestamp under the same tags,
/// so the pipeline can read them without knowing the concrete type.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct StateHead {
    /// Back-pointer to the winning event.
    #[serde(rename = "e", default)]
    pub event: Option<EventPath>,
    /// State-content hash.
    #[serde(rename = "h", default)]
    pub hash: String,
    /// Stable entity id.
    #[serde(rename = "id", default)]
    pub id: String,
    /// Timestamp of the winning write.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

/// A signed client request wrapping one entity payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPayload {
    /// The account (DID) on whose behalf the payload acts.
    #[serde(rename = "acct", default, skip_serializing_if = "String::is_empty")]
    pub account: String,
    /// The agent device key acting for the account, when any.
    #[serde(rename = "agt", default, skip_serializing_if = "String::is_empty")]
    pub agent: String,
    /// The entity data.
    #[serde(rename = "d")]
    pub data: PayloadData,
    /// The signer's signature over the payload hash.
    #[serde(rename = "sigD", default)]
    pub signature: SignatureData,
    /// The subnet this payload addresses, when scoped.
    #[serde(rename = "snet", default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,
    /// Client-chosen timestamp, milliseconds since epoch. The ordering input
    /// of `IsMoreRecent`.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
    /// What the payload does to its entity.
    #[serde(rename = "ty", default)]
    pub event_type: EventKind,
    /// The SECP address of the validator chosen to admit this payload.
    #[serde(rename = "v", default, skip_serializing_if = "String::is_empty")]
    pub validator: String,
}

impl ClientPayload {
    /// Canonical bytes with the signature cleared; the preimage of the
    /// payload hash that clients sign.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut unsigned = self.clone();
        unsigned.signature = SignatureData::default();
        codec::to_bytes_canonical(&unsigned)
    }

    /// Hex keccak-256 of [`Self::signing_bytes`].
    pub fn hash(&self) -> Result<String, CodecError> {
        let mut unsigned = self.clone();
        unsigned.signature = SignatureData::default();
        codec::canonical_hash_hex(&unsigned)
    }
}

/// The signed, replicated unit of state change: a client payload wrapped
/// with network metadata.
///
/// An event is written exactly once to the event log and is thereafter
/// immutable except for three metadata flips: `broadcasted` false→true,
/// `synced` false→true and `is_valid` unknown→known. None of the mutable
/// fields participate in the id or signature preimage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The auth event authorizing this payload, when one applies.
    #[serde(rename = "authE", default, skip_serializing_if = "Option::is_none")]
    pub auth_event: Option<EventPath>,
    /// Chain block number at production.
    #[serde(rename = "blk", default)]
    pub block_number: u64,
    /// Whether this node has already published the event to gossip.
    #[serde(rename = "br", default, skip_serializing_if = "std::ops::Not::not")]
    pub broadcasted: bool,
    /// Chain cycle at production.
    #[serde(rename = "cy", default)]
    pub cycle: u64,
    /// Chain epoch at production.
    #[serde(rename = "ep", default)]
    pub epoch: u64,
    /// The payload error attached when validation rejected the event.
    #[serde(rename = "err", default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Content hash: hex keccak-256 of the canonical encoding without id,
    /// signature and local metadata. The tie-break input of `IsMoreRecent`.
    #[serde(rename = "h", default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    /// Stable identifier; equals the content hash at creation (I2).
    #[serde(rename = "id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Tri-state validity: `None` until validated.
    #[serde(rename = "isVal", default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    /// Hex keccak-256 of the canonical client payload.
    #[serde(rename = "pH", default, skip_serializing_if = "String::is_empty")]
    pub payload_hash: String,
    /// The client payload.
    #[serde(rename = "pld")]
    pub payload: ClientPayload,
    /// The previous event on the same entity, or `None` for a first write.
    #[serde(rename = "preE", default, skip_serializing_if = "Option::is_none")]
    pub previous_event: Option<EventPath>,
    /// The producing validator's Ed25519 signature over the signing bytes.
    #[serde(rename = "sig", default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    /// The subnet the event belongs to (resolved at apply time for creates).
    #[serde(rename = "snet", default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,
    /// Whether the dependency chain of this event is locally complete.
    #[serde(rename = "sync", default, skip_serializing_if = "Option::is_none")]
    pub synced: Option<bool>,
    /// The event kind, mirroring the payload's.
    #[serde(rename = "t", default)]
    pub event_type: EventKind,
    /// Validator-side timestamp, milliseconds since epoch.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
    /// The producing validator's Ed25519 public key, hex.
    #[serde(rename = "v", default, skip_serializing_if = "String::is_empty")]
    pub validator: String,
}

impl Event {
    /// Canonical bytes without id, signature or mutable local metadata: the
    /// preimage of both the event id and the validator signature (I2).
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut unsigned = self.clone();
        unsigned.id = String::new();
        unsigned.hash = String::new();
        unsigned.signature = String::new();
        unsigned.broadcasted = false;
        unsigned.synced = None;
        unsigned.is_valid = None;
        unsigned.error = String::new();
        codec::to_bytes_canonical(&unsigned)
    }

    /// Recomputes the content hash from the signing bytes.
    pub fn compute_hash(&self) -> Result<String, CodecError> {
        let bytes = self.signing_bytes()?;
        Ok(hex::encode(codec::keccak256(&bytes)))
    }

    /// Seals id and hash from the current contents. Call once at creation,
    /// before signing.
    pub fn seal(&mut self) -> Result<(), CodecError> {
        let h = self.compute_hash()?;
        self.id = h.clone();
        self.hash = h;
        Ok(())
    }

    /// The entity model this event addresses.
    pub fn model(&self) -> EntityModel {
        self.payload.data.model()
    }

    /// The path other events use to reference this one.
    pub fn path(&self) -> EventPath {
        EventPath::new(self.validator.clone(), self.model(), self.id.clone())
    }

    /// True when the id matches the recomputed content hash (I2, first half).
    pub fn id_is_consistent(&self) -> Result<bool, CodecError> {
        Ok(self.id == self.compute_hash()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        let subnet = Subnet {
            reference: "acme.chat".into(),
            account: "did:0x11".into(),
            ..Default::default()
        };
        let mut event = Event {
            auth_event: None,
            block_number: 10,
            broadcasted: false,
            cycle: 7,
            epoch: 2,
            error: String::new(),
            hash: String::new(),
            id: String::new(),
            is_valid: None,
            payload_hash: String::new(),
            payload: ClientPayload {
                account: "did:0x11".into(),
                agent: String::new(),
                data: PayloadData::Subnet(subnet),
                signature: SignatureData::default(),
                subnet: String::new(),
                timestamp: 1000,
                event_type: EventKind::Create,
                validator: "0xfeed".into(),
            },
            previous_event: None,
            signature: String::new(),
            subnet: String::new(),
            synced: None,
            event_type: EventKind::Create,
            timestamp: 1000,
            validator: "aa".repeat(32),
        };
        event.payload_hash = event.payload.hash().unwrap();
        event.seal().unwrap();
        event
    }

    #[test]
    fn id_depends_only_on_canonical_content() {
        let a = sample_event();
        let mut b = a.clone();
        // Metadata flips must not disturb the identity.
        b.broadcasted = true;
        b.synced = Some(true);
        b.is_valid = Some(false);
        b.error = "4003: nope".into();
        assert_eq!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
        assert!(b.id_is_consistent().unwrap());
    }

    #[test]
    fn signature_is_excluded_from_preimage() {
        let a = sample_event();
        let mut b = a.clone();
        b.signature = "ff".repeat(64);
        assert_eq!(
            a.signing_bytes().unwrap(),
            b.signing_bytes().unwrap()
        );
    }

    #[test]
    fn event_roundtrips_canonically() {
        let event = sample_event();
        let bytes = codec::to_bytes_canonical(&event).unwrap();
        let back: Event = codec::from_bytes_canonical(&bytes).unwrap();
        assert_eq!(event, back);
        assert_eq!(bytes, codec::to_bytes_canonical(&back).unwrap());
    }

    #[test]
    fn payload_hash_ignores_signature() {
        let event = sample_event();
        let mut signed = event.payload.clone();
        signed.signature = SignatureData {
            public_key: String::new(),
            signature: "aabb".into(),
            sig_type: SignatureType::EthereumSecp,
        };
        assert_eq!(event.payload.hash().unwrap(), signed.hash().unwrap());
    }

    #[test]
    fn model_strings_roundtrip() {
        for model in EntityModel::ALL {
            let parsed: EntityModel = model.as_str().parse().unwrap();
            assert_eq!(parsed, model);
            assert!(model.pubsub_topic().starts_with("mlayer."));
        }
    }
}
