// Path: crates/crypto/src/lib.rs
#![forbid(unsafe_code)]

//! # mlayer Crypto
//!
//! Signature schemes, hashing and passphrase key storage for the mlayer
//! node: Ed25519 for validator/event signatures, SECP256k1 with Ethereum
//! recovery for account signatures, Tendermint Amino (ADR-036) verification
//! for cross-chain wallets, and the Argon2id/ChaCha20-Poly1305 key store.

/// Keccak-256 and SHA-256 helpers.
pub mod hash;
/// Passphrase-encrypted private key storage.
pub mod key_store;
/// Signature schemes.
pub mod sign;

pub use mlayer_types::error::CryptoError;
