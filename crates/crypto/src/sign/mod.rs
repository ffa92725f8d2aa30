// Path: crates/crypto/src/sign/mod.rs
//! Signature schemes: Ed25519 (node identity), SECP256k1 with Ethereum
//! recovery (accounts), and Tendermint Amino ADR-036 (cross-chain wallets).

/// Tendermint Amino (ADR-036) verification.
pub mod amino;
/// Ed25519 signing and verification.
pub mod ed25519;
/// SECP256k1 with Ethereum-style recovery.
pub mod secp;
