// Path: crates/types/src/entities/authorization.rs

use super::{EntityData, EntityModel, EventPath, Privilege, SignatureData};
use crate::codec;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// A grant from an account to an agent device key with a privilege level,
/// optionally scoped to a subnet. Identity is `(account, agent, subnet)`, so
/// re-granting overwrites rather than accumulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Authorization {
    /// Granting account (DID).
    #[serde(rename = "acct", default, skip_serializing_if = "String::is_empty")]
    pub account: String,
    /// The authorized agent device id.
    #[serde(rename = "agt", default, skip_serializing_if = "String::is_empty")]
    pub agent: String,
    /// Expiry of the grant, milliseconds since epoch; must be in the future
    /// at validation time.
    #[serde(rename = "apExp", default)]
    pub expiry: u64,
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
    /// Delegating grantor account, when the signer is not `account`.
    #[serde(rename = "gr", default, skip_serializing_if = "String::is_empty")]
    pub grantor: String,
    /// State-content hash of this row.
    #[serde(rename = "h", default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    /// Stable entity id.
    #[serde(rename = "id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Granted privilege level.
    #[serde(rename = "privi", default)]
    pub privilege: Privilege,
    /// The grantor's signature over the grant.
    #[serde(rename = "sigD", default, skip_serializing_if = "sig_is_empty")]
    pub signature: SignatureData,
    /// Scoping subnet id, empty for account-wide grants.
    #[serde(rename = "snet", default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,
    /// Timestamp of the winning write, milliseconds.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

fn sig_is_empty(s: &SignatureData) -> bool {
    s.signature.is_empty() && s.public_key.is_empty()
}

#[derive(Serialize)]
struct AuthorizationIdentity<'a> {
    #[serde(rename = "acct")]
    account: &'a str,
    #[serde(rename = "agt")]
    agent: &'a str,
    #[serde(rename = "snet")]
    subnet: &'a str,
}

impl EntityData for Authorization {
    fn model(&self) -> EntityModel {
        EntityModel::Authorization
    }

    fn derive_id(&self) -> Result<String, CodecError> {
        codec::canonical_hash_hex(&AuthorizationIdentity {
            account: &self.account,
            agent: &self.agent,
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
    fn identity_is_the_grant_triple() {
        let a = Authorization {
            account: "did:0xab".into(),
            agent: "dev:1".into(),
            subnet: "s1".into(),
            privilege: Privilege::Read,
            expiry: 10,
            ..Default::default()
        };
        let mut regrant = a.clone();
        regrant.privilege = Privilege::Admin;
        regrant.expiry = 99;
        // Re-granting the same triple targets the same entity row.
        assert_eq!(a.derive_id().unwrap(), regrant.derive_id().unwrap());

        let mut other_agent = a.clone();
        other_agent.agent = "dev:2".into();
        assert_ne!(a.derive_id().unwrap(), other_agent.derive_id().unwrap());
    }

    #[test]
    fn privilege_ordering_expresses_at_least() {
        assert!(Privilege::Admin >= Privilege::Write);
        assert!(Privilege::Write >= Privilege::Read);
        assert!(Privilege::Read < Privilege::Write);
    }
}
