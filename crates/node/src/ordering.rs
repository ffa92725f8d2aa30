// Path: crates/node/src/ordering.rs

//! The deterministic "is more recent" relation between competing events.
//!
//! Later timestamp wins; equal timestamps are broken by byte-wise comparison
//! of the raw decoded hashes (not the hex text, though the two orders agree
//! for fixed-length lowercase hex). Equal hashes mean the same event, which
//! is never more recent than itself. The relation is total and
//! antisymmetric, which is what lets every node converge on the same winner
//! regardless of arrival order.

use std::cmp::Ordering;

fn cmp_hashes(a: &str, b: &str) -> Ordering {
    match (hex::decode(a), hex::decode(b)) {
        (Ok(ra), Ok(rb)) => ra.cmp(&rb),
        // Non-hex identifiers only appear in tests; order their bytes.
        _ => a.as_bytes().cmp(b.as_bytes()),
    }
}

/// True when `(new_ts, new_hash)` supersedes `(old_ts, old_hash)`.
pub fn is_more_recent(old_ts: u64, old_hash: &str, new_ts: u64, new_hash: &str) -> bool {
    match old_ts.cmp(&new_ts) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => cmp_hashes(old_hash, new_hash) == Ordering::Less,
    }
}

/// The event-level helper used during sync reconciliation: compares two
/// events by `(timestamp, hash)` under the same rule.
pub fn is_more_recent_event(
    old_hash: &str,
    old_timestamp: u64,
    new_hash: &str,
    new_timestamp: u64,
) -> bool {
    is_more_recent(old_timestamp, old_hash, new_timestamp, new_hash)
}
