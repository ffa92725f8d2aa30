// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]

//! # mlayer Types
//!
//! This crate is the foundational library for the mlayer node, containing the
//! entity model, the canonical wire codec, datastore key builders, error
//! types and node configuration.
//!
//! ## Architectural Role
//!
//! As the base crate, `mlayer-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `Event`, `ClientPayload` and the error enums.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::AppError> = std::result::Result<T, E>;

/// The canonical, deterministic binary codec used for hashing, signing and
/// inter-node transfer.
pub mod codec;
/// Node configuration structures.
pub mod config;
/// The entity model: events, client payloads and the per-entity data types.
pub mod entities;
/// A unified set of the error types used across the workspace.
pub mod error;
/// Builders for datastore and counter keys.
pub mod keys;
