// Path: crates/storage/src/lib.rs
#![forbid(unsafe_code)]

//! # mlayer Storage
//!
//! The ordered, transactional key/value datastore the node runs on: one
//! `redb` database holding a table per named store, `/`-separated keys,
//! prefix iteration as the only enumeration primitive, and buffered write
//! batches that commit atomically. A missing key is `Ok(None)`, never an
//! error.

mod datastore;

pub use datastore::{decode_u64, encode_u64, StoreName, Stores, WriteBatch};
pub use mlayer_types::error::StoreError;
