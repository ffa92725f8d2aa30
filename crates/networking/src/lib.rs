// Path: crates/networking/src/lib.rs

//! # mlayer Networking
//!
//! The peer-to-peer fabric: a gossipsub topic per entity type for event
//! fan-out, plus a signed request/response channel for point-to-point event
//! and state fetches. Built on libp2p over TCP + Noise + Yamux — the
//! authenticated peer channel the rest of the node sees.

/// Client handshake validation.
pub mod handshake;
/// The libp2p swarm, commands and events.
pub mod libp2p;
/// Network-facing traits shared with the node.
pub mod traits;
