// Path: crates/node/src/stats.rs

//! The counter/stats aggregator.
//!
//! A dedicated worker owns the `networkStats` store. Every second it drains
//! the counter channel into an in-memory map keyed by the counter keys an
//! event contributes to, then flushes the whole map in one transaction:
//! additive get-then-put updates for counters, overwrites for the
//! recent-event-in-cycle pointers. A failed flush is retried once, then
//! dropped with a metric increment.

use mlayer_storage::{encode_u64, StoreName, Stores, WriteBatch};
use mlayer_types::entities::Event;
use mlayer_types::keys;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Accumulated deltas and overwrites for one flush.
#[derive(Default)]
struct PendingStats {
    counts: HashMap<String, u64>,
    recent: HashMap<String, String>,
}

impl PendingStats {
    fn absorb(&mut self, event: &Event) {
        for key in keys::block_stats_keys(event) {
            if key == keys::recent_event_key(event.cycle) {
                self.recent.insert(key, event.id.clone());
            } else {
                *self.counts.entry(key).or_insert(0) += 1;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.recent.is_empty()
    }
}

fn flush(stores: &Stores, pending: &PendingStats) -> Result<(), mlayer_types::error::StoreError> {
    let mut batch = WriteBatch::default();
    for (key, delta) in &pending.counts {
        let current = stores.get_counter(StoreName::NetworkStats, key)?;
        batch.put(
            StoreName::NetworkStats,
            key,
            encode_u64(current + delta).to_vec(),
        );
    }
    for (key, event_id) in &pending.recent {
        batch.put(
            StoreName::NetworkStats,
            key,
            event_id.clone().into_bytes(),
        );
    }
    stores.commit(batch)
}

fn flush_with_retry(stores: &Stores, pending: PendingStats) {
    if pending.is_empty() {
        return;
    }
    if flush(stores, &pending).is_ok() {
        return;
    }
    if let Err(e) = flush(stores, &pending) {
        tracing::error!(target: "stats", error = %e, "stats flush dropped after retry");
        let failed = stores
            .get_counter(StoreName::NetworkStats, keys::STATS_FLUSH_FAILED_KEY)
            .unwrap_or(0);
        stores
            .put(
                StoreName::NetworkStats,
                keys::STATS_FLUSH_FAILED_KEY,
                encode_u64(failed + 1).to_vec(),
            )
            .ok();
    }
}

/// Spawns the aggregator worker.
pub fn spawn_stats_worker(
    stores: Stores,
    mut rx: mpsc::Receiver<Box<Event>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut pending = PendingStats::default();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        while let Ok(event) = rx.try_recv() {
                            pending.absorb(&event);
                        }
                        flush_with_retry(&stores, std::mem::take(&mut pending));
                        break;
                    }
                }
                next = rx.recv() => match next {
                    Some(event) => pending.absorb(&event),
                    None => {
                        flush_with_retry(&stores, std::mem::take(&mut pending));
                        break;
                    }
                },
                _ = ticker.tick() => {
                    flush_with_retry(&stores, std::mem::take(&mut pending));
                }
            }
        }
    })
}

/// Drains and flushes synchronously; used by tests that cannot wait for the
/// timer and by shutdown paths that own the receiver.
pub fn drain_and_flush(stores: &Stores, rx: &mut mpsc::Receiver<Box<Event>>) {
    let mut pending = PendingStats::default();
    while let Ok(event) = rx.try_recv() {
        pending.absorb(&event);
    }
    flush_with_retry(stores, pending);
}

/// Convenience used by surfaces showing totals.
pub fn network_total(stores: &Stores) -> u64 {
    stores
        .get_counter(StoreName::NetworkStats, &keys::network_counter_key(None))
        .unwrap_or(0)
}
