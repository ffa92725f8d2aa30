// Path: crates/storage/src/datastore.rs

//! Named stores over a single `redb` database.

use mlayer_types::error::StoreError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// ---- Table definitions (single DB, one table per named store) ----
const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("events");
const CURRENT_STATE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("currentState");
const HISTORIC_STATE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("historicState");
const NETWORK_STATS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("networkStats");
const EVENT_COUNT: TableDefinition<&[u8], &[u8]> = TableDefinition::new("eventCount");
const CHAIN_CACHE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("chainCache");
const DEAD_LETTERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("deadLetters");

/// The named stores of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreName {
    /// The append-once event log, keyed by event id.
    Events,
    /// Latest winning entity views, keyed by `/<model>/<id>`.
    CurrentState,
    /// Non-winning past versions, keyed by `/<model>/<id>/<event id>`.
    HistoricState,
    /// Counters and the recent-event-per-cycle pointers.
    NetworkStats,
    /// Per-account event counters.
    EventCount,
    /// Mirror of the chain oracle cache for cold starts.
    ChainCache,
    /// Events the pipeline gave up on after exhausting retries.
    DeadLetters,
}

impl StoreName {
    fn table(&self) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
        match self {
            StoreName::Events => EVENTS,
            StoreName::CurrentState => CURRENT_STATE,
            StoreName::HistoricState => HISTORIC_STATE,
            StoreName::NetworkStats => NETWORK_STATS,
            StoreName::EventCount => EVENT_COUNT,
            StoreName::ChainCache => CHAIN_CACHE,
            StoreName::DeadLetters => DEAD_LETTERS,
        }
    }

    const ALL: [StoreName; 7] = [
        StoreName::Events,
        StoreName::CurrentState,
        StoreName::HistoricState,
        StoreName::NetworkStats,
        StoreName::EventCount,
        StoreName::ChainCache,
        StoreName::DeadLetters,
    ];
}

/// Big-endian u64 encoding used for counters.
pub fn encode_u64(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

/// Decodes a counter value; short or absent values read as zero so a fresh
/// counter increments cleanly.
pub fn decode_u64(bytes: &[u8]) -> u64 {
    let mut a = [0u8; 8];
    let n = bytes.len().min(8);
    a[8 - n..].copy_from_slice(&bytes[..n]);
    u64::from_be_bytes(a)
}

#[derive(Clone)]
enum Op {
    Put(Vec<u8>),
    Delete,
}

/// A buffered multi-store write set, applied in a single transaction by
/// [`Stores::commit`]. Partial application is impossible: either every
/// operation lands or none do.
#[derive(Default, Clone)]
pub struct WriteBatch {
    ops: Vec<(StoreName, Vec<u8>, Op)>,
}

impl WriteBatch {
    /// Buffers a put.
    pub fn put(&mut self, store: StoreName, key: impl AsRef<str>, value: Vec<u8>) {
        self.ops
            .push((store, key.as_ref().as_bytes().to_vec(), Op::Put(value)));
    }

    /// Buffers a delete.
    pub fn delete(&mut self, store: StoreName, key: impl AsRef<str>) {
        self.ops
            .push((store, key.as_ref().as_bytes().to_vec(), Op::Delete));
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Handle to the node's datastore.
#[derive(Clone)]
pub struct Stores {
    db: Arc<Database>,
}

impl Stores {
    /// Opens (or creates) the database and ensures every table exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let txn = db
                .begin_write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            for store in StoreName::ALL {
                txn.open_table(store.table())
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
            txn.commit().map_err(|e| StoreError::Commit(e.to_string()))?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    /// Reads one key. Missing keys are `Ok(None)`.
    pub fn get(&self, store: StoreName, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = txn
            .open_table(store.table())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let value = table
            .get(key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    /// True when the key exists.
    pub fn has(&self, store: StoreName, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(store, key)?.is_some())
    }

    /// Writes one key in its own transaction.
    pub fn put(&self, store: StoreName, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.put(store, key, value);
        self.commit(batch)
    }

    /// Deletes one key in its own transaction.
    pub fn delete(&self, store: StoreName, key: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.delete(store, key);
        self.commit(batch)
    }

    /// Applies a buffered batch atomically.
    pub fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for (store, key, op) in &batch.ops {
            let mut table = txn
                .open_table(store.table())
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            match op {
                Op::Put(value) => {
                    table
                        .insert(key.as_slice(), value.as_slice())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                }
                Op::Delete => {
                    table
                        .remove(key.as_slice())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                }
            }
        }
        txn.commit().map_err(|e| StoreError::Commit(e.to_string()))
    }

    /// Iterates keys under a prefix in order, starting after `cursor` when
    /// one is given, yielding at most `limit` entries.
    pub fn iter_prefix(
        &self,
        store: StoreName,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = txn
            .open_table(store.table())
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let start_owned: Vec<u8> = match cursor {
            // Resume strictly after the cursor key.
            Some(c) => {
                let mut s = c.as_bytes().to_vec();
                s.push(0);
                s
            }
            None => prefix.as_bytes().to_vec(),
        };
        let iter = table
            .range(start_owned.as_slice()..)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out = Vec::new();
        for entry in iter {
            let (k, v) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            let key_bytes = k.value();
            if !key_bytes.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8_lossy(key_bytes).into_owned();
            out.push((key, v.value().to_vec()));
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Reads a big-endian counter, defaulting to zero.
    pub fn get_counter(&self, store: StoreName, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .get(store, key)?
            .map(|bytes| decode_u64(&bytes))
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, Stores) {
        let dir = tempdir().unwrap();
        let stores = Stores::open(dir.path().join("store.redb")).unwrap();
        (dir, stores)
    }

    #[test]
    fn missing_key_is_none_not_error() {
        let (_dir, stores) = open_temp();
        assert_eq!(stores.get(StoreName::Events, "/nope").unwrap(), None);
        assert!(!stores.has(StoreName::Events, "/nope").unwrap());
    }

    #[test]
    fn put_get_delete() {
        let (_dir, stores) = open_temp();
        stores
            .put(StoreName::Events, "/e1", b"payload".to_vec())
            .unwrap();
        assert_eq!(
            stores.get(StoreName::Events, "/e1").unwrap(),
            Some(b"payload".to_vec())
        );
        stores.delete(StoreName::Events, "/e1").unwrap();
        assert_eq!(stores.get(StoreName::Events, "/e1").unwrap(), None);
    }

    #[test]
    fn batch_is_atomic_across_stores() {
        let (_dir, stores) = open_temp();
        let mut batch = WriteBatch::default();
        batch.put(StoreName::Events, "/e1", b"event".to_vec());
        batch.put(StoreName::CurrentState, "/subnet/s1", b"state".to_vec());
        batch.put(StoreName::NetworkStats, "/events/network", encode_u64(1).to_vec());
        stores.commit(batch).unwrap();

        assert!(stores.has(StoreName::Events, "/e1").unwrap());
        assert!(stores.has(StoreName::CurrentState, "/subnet/s1").unwrap());
        assert_eq!(
            stores
                .get_counter(StoreName::NetworkStats, "/events/network")
                .unwrap(),
            1
        );
    }

    #[test]
    fn prefix_iteration_respects_bounds_and_cursor() {
        let (_dir, stores) = open_temp();
        for id in ["a", "b", "c"] {
            stores
                .put(
                    StoreName::HistoricState,
                    &format!("/topic/t1/{id}"),
                    id.as_bytes().to_vec(),
                )
                .unwrap();
        }
        stores
            .put(StoreName::HistoricState, "/topic/t2/x", b"x".to_vec())
            .unwrap();

        let all = stores
            .iter_prefix(StoreName::HistoricState, "/topic/t1/", 10, None)
            .unwrap();
        assert_eq!(all.len(), 3);

        let limited = stores
            .iter_prefix(StoreName::HistoricState, "/topic/t1/", 2, None)
            .unwrap();
        assert_eq!(limited.len(), 2);

        let resumed = stores
            .iter_prefix(
                StoreName::HistoricState,
                "/topic/t1/",
                10,
                Some(&limited.last().unwrap().0),
            )
            .unwrap();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].0, "/topic/t1/c");
    }

    #[test]
    fn counters_decode_zero_when_absent() {
        let (_dir, stores) = open_temp();
        assert_eq!(
            stores
                .get_counter(StoreName::NetworkStats, "/events/cycle/9")
                .unwrap(),
            0
        );
        assert_eq!(decode_u64(&encode_u64(99)), 99);
        assert_eq!(decode_u64(&[]), 0);
    }
}
