// Path: crates/node/src/lib.rs
#![forbid(unsafe_code)]

//! # mlayer Node
//!
//! The event ingestion and state convergence engine: a single-threaded
//! dispatcher pulls events off one ingress channel and runs each through the
//! per-entity pipeline — deduplicate, authority check, signature check,
//! dependency check, payload validation, ordering decision, transactional
//! apply, broadcast, notify. Competing writes converge through the
//! deterministic latest-writer-wins order; missing dependencies are pulled
//! from peers by the sync engine.

/// The node context threaded through every worker.
pub mod context;
/// Client subscription fan-out.
pub mod fanout;
/// The ingress channel and its single-threaded dispatcher.
pub mod ingress;
/// Node assembly: workers, the swarm bridge and the request server.
pub mod node;
/// The chain oracle cache.
pub mod oracle;
/// The deterministic is-more-recent order.
pub mod ordering;
/// The per-event pipeline.
pub mod pipeline;
/// The counter/stats aggregator.
pub mod stats;
/// The point-to-point sync engine.
pub mod sync;
/// Per-entity payload validators.
pub mod validate;
