// Path: crates/types/src/keys.rs
//! Builders for the `/`-separated datastore and counter keys.
//!
//! These are the single source of truth for every key written to the named
//! stores, preventing drift between the pipeline, the counter aggregator and
//! ops tooling that re-derives views by prefix iteration.

use crate::entities::{EntityModel, Event};

/// Key of an event in the `events` store.
pub fn event_key(id: &str) -> String {
    format!("/{id}")
}

/// Key of an entity's current-state row.
pub fn current_state_key(model: EntityModel, id: &str) -> String {
    format!("/{model}/{id}")
}

/// Prefix under which all current-state rows of a model live.
pub fn current_state_prefix(model: EntityModel) -> String {
    format!("/{model}/")
}

/// Key of one historic (non-winning) state row, unique per (entity, event).
pub fn historic_state_key(model: EntityModel, id: &str, event_id: &str) -> String {
    format!("/{model}/{id}/{event_id}")
}

/// Prefix of all historic rows of one entity.
pub fn historic_state_prefix(model: EntityModel, id: &str) -> String {
    format!("/{model}/{id}/")
}

/// Key of a dead-lettered event, qualified by the attempt that buried it.
pub fn dead_letter_key(id: &str, attempt: u32) -> String {
    format!("/{id}/{attempt}")
}

// --- Counter keys (in the `networkStats` store) ---

/// Network-wide event total, optionally narrowed to one subnet.
pub fn network_counter_key(subnet: Option<&str>) -> String {
    match subnet {
        Some(s) if !s.is_empty() => format!("/events/network/{s}"),
        _ => "/events/network".to_string(),
    }
}

/// Per-cycle event total, optionally narrowed to a validator and/or subnet.
pub fn cycle_counter_key(cycle: u64, validator: Option<&str>, subnet: Option<&str>) -> String {
    let mut key = format!("/events/cycle/{cycle}");
    if let Some(v) = validator.filter(|v| !v.is_empty()) {
        key.push_str(&format!("/val/{v}"));
    }
    if let Some(s) = subnet.filter(|s| !s.is_empty()) {
        key.push_str(&format!("/snet/{s}"));
    }
    key
}

/// Per-(cycle, subnet) event total.
pub fn cycle_subnet_key(cycle: u64, subnet: &str) -> String {
    format!("/events/cycle/{cycle}/snet/{subnet}")
}

/// Overwrite key holding the id of the most recent event seen in a cycle.
pub fn recent_event_key(cycle: u64) -> String {
    format!("/events/cycle/{cycle}/recent")
}

/// Per-account event counter.
pub fn account_counter_key(account: &str) -> String {
    format!("/acct/{account}")
}

/// Counter of peer events shed at ingress because the channel was full.
pub const DROPPED_INGRESS_KEY: &str = "/metrics/dropped-ingress";
/// Counter of events dropped for an unknown validator.
pub const INVALID_VALIDATOR_KEY: &str = "/metrics/invalid-validator";
/// Counter of events dropped for a bad node signature.
pub const INVALID_SIGNATURE_KEY: &str = "/metrics/invalid-signature";
/// Counter of stats batches dropped after a failed retry.
pub const STATS_FLUSH_FAILED_KEY: &str = "/metrics/stats-flush-failed";

/// The full set of counter keys an event contributes to, plus the
/// recent-event overwrite key (always last).
pub fn block_stats_keys(event: &Event) -> Vec<String> {
    let subnet = if event.subnet.is_empty() {
        event.payload.subnet.as_str()
    } else {
        event.subnet.as_str()
    };
    let mut keys = vec![
        network_counter_key(None),
        cycle_counter_key(event.cycle, None, None),
        cycle_counter_key(event.cycle, Some(&event.validator), None),
    ];
    if !subnet.is_empty() {
        keys.push(network_counter_key(Some(subnet)));
        keys.push(cycle_subnet_key(event.cycle, subnet));
    }
    keys.push(recent_event_key(event.cycle));
    keys
}

// --- Chain-cache mapping keys ---

/// Maps a validator's SECP key to its Ed25519 key.
pub fn secp_edd_key(secp: &str) -> String {
    format!("secp/{secp}/edd")
}

/// Maps a validator's SECP key to its license-owner address.
pub fn secp_addr_key(secp: &str) -> String {
    format!("secp/{secp}/addr")
}

/// Maps a validator's Ed25519 key to its SECP key.
pub fn edd_secp_key(edd: &str) -> String {
    format!("edd/{edd}/secp")
}

/// Maps a validator's Ed25519 key to its license-owner address.
pub fn edd_addr_key(edd: &str) -> String {
    format!("edd/{edd}/addr")
}

/// Re-export of the codec's keccak for key-adjacent hashing needs.
pub use crate::codec::keccak256;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ClientPayload, EventKind, PayloadData, SignatureData, Subnet};

    fn event_in(cycle: u64, subnet: &str, validator: &str) -> Event {
        Event {
            auth_event: None,
            block_number: 0,
            broadcasted: false,
            cycle,
            epoch: 0,
            error: String::new(),
            hash: String::new(),
            id: "e1".into(),
            is_valid: None,
            payload_hash: String::new(),
            payload: ClientPayload {
                account: "did:0xab".into(),
                agent: String::new(),
                data: PayloadData::Subnet(Subnet::default()),
                signature: SignatureData::default(),
                subnet: subnet.into(),
                timestamp: 0,
                event_type: EventKind::Create,
                validator: String::new(),
            },
            previous_event: None,
            signature: String::new(),
            subnet: String::new(),
            synced: None,
            event_type: EventKind::Create,
            timestamp: 0,
            validator: validator.into(),
        }
    }

    #[test]
    fn stats_keys_cover_all_buckets() {
        let keys = block_stats_keys(&event_in(7, "s1", "v1"));
        assert!(keys.contains(&"/events/network".to_string()));
        assert!(keys.contains(&"/events/cycle/7".to_string()));
        assert!(keys.contains(&"/events/cycle/7/val/v1".to_string()));
        assert!(keys.contains(&"/events/network/s1".to_string()));
        assert!(keys.contains(&"/events/cycle/7/snet/s1".to_string()));
        assert_eq!(keys.last().unwrap(), &recent_event_key(7));
    }

    #[test]
    fn subnetless_events_skip_subnet_buckets() {
        let keys = block_stats_keys(&event_in(3, "", "v1"));
        assert_eq!(keys.len(), 4);
        assert!(!keys.iter().any(|k| k.contains("/snet/")));
    }

    #[test]
    fn state_keys_nest_by_model() {
        let cur = current_state_key(EntityModel::Topic, "t1");
        assert_eq!(cur, "/topic/t1");
        assert!(historic_state_key(EntityModel::Topic, "t1", "e9")
            .starts_with(&historic_state_prefix(EntityModel::Topic, "t1")));
    }
}
