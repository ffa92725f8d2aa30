// Path: crates/types/src/error.rs
//! Core error types for the mlayer node.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// The application-level error taxonomy attached to events and surfaced to
/// clients. The numeric codes match the wire protocol: `4000` bad request,
/// `4001` unauthorized, `4003` forbidden, `4004` not found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Signature bad or signer not permitted.
    #[error("4001: {0}")]
    Unauthorized(String),
    /// Permission exists but is insufficient.
    #[error("4003: {0}")]
    Forbidden(String),
    /// Malformed field or bound violation.
    #[error("4000: {0}")]
    BadRequest(String),
    /// A dependency is missing; actionable by sync.
    #[error("4004: {0}")]
    NotFound(String),
    /// Duplicate event id.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Datastore or network I/O failure; retried.
    #[error("transient: {0}")]
    Transient(String),
    /// Invariant violation.
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    /// The numeric code reported on the RPC/WS surface, when one exists.
    pub fn rpc_code(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(4000),
            Self::Unauthorized(_) => Some(4001),
            Self::Forbidden(_) => Some(4003),
            Self::NotFound(_) => Some(4004),
            _ => None,
        }
    }

    /// True for errors that sync can resolve or retry; false for errors that
    /// are final for the offending payload.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Transient(_))
    }
}

impl ErrorCode for AppError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "APP_UNAUTHORIZED",
            Self::Forbidden(_) => "APP_FORBIDDEN",
            Self::BadRequest(_) => "APP_BAD_REQUEST",
            Self::NotFound(_) => "APP_NOT_FOUND",
            Self::Conflict(_) => "APP_CONFLICT",
            Self::Transient(_) => "APP_TRANSIENT",
            Self::Internal(_) => "APP_INTERNAL",
        }
    }
}

/// Errors from the canonical codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value could not be encoded (e.g. exceeds declared bounds).
    #[error("bad encoding: {0}")]
    Encode(String),
    /// A byte stream could not be decoded into the expected type.
    #[error("canonical decode failed: {0}")]
    Decode(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "CODEC_ENCODE_FAILED",
            Self::Decode(_) => "CODEC_DECODE_FAILED",
        }
    }
}

impl From<CodecError> for AppError {
    fn from(e: CodecError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

/// Errors from cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The signature failed cryptographic verification.
    #[error("signature verification failed")]
    BadSignature,
    /// The provided key material is malformed or invalid for the algorithm.
    #[error("invalid public key: {0}")]
    BadPublicKey(String),
    /// The provided private key material is malformed.
    #[error("invalid private key: {0}")]
    BadPrivateKey(String),
    /// Key derivation from a passphrase failed.
    #[error("key derivation failed: {0}")]
    KdfFailure(String),
    /// A generic failure in an underlying cryptographic primitive.
    #[error("cryptographic operation failed: {0}")]
    OperationFailed(String),
    /// An input to a cryptographic operation was invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::BadSignature => "CRYPTO_BAD_SIGNATURE",
            Self::BadPublicKey(_) => "CRYPTO_BAD_PUBLIC_KEY",
            Self::BadPrivateKey(_) => "CRYPTO_BAD_PRIVATE_KEY",
            Self::KdfFailure(_) => "CRYPTO_KDF_FAILURE",
            Self::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
            Self::InvalidInput(_) => "CRYPTO_INVALID_INPUT",
        }
    }
}

impl From<CryptoError> for AppError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::BadSignature => AppError::Unauthorized("invalid signature".into()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

/// Errors from the datastore abstraction.
///
/// A missing key is *not* an error: reads return `Ok(None)`. These variants
/// cover genuine backend and transaction failures, which the pipeline treats
/// as `Transient`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An error in the storage backend.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A transaction could not be committed.
    #[error("transaction commit failed: {0}")]
    Commit(String),
    /// A stored value could not be decoded.
    #[error("stored value decode failed: {0}")]
    Decode(String),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Commit(_) => "STORE_COMMIT_FAILED",
            Self::Decode(_) => "STORE_DECODE_FAILED",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Transient(e.to_string())
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Errors from the chain oracle.
#[derive(Error, Debug)]
pub enum ChainError {
    /// The external chain client could not be reached.
    #[error("chain client unavailable: {0}")]
    Unavailable(String),
    /// The chain client returned malformed data.
    #[error("chain client returned bad data: {0}")]
    BadData(String),
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "CHAIN_UNAVAILABLE",
            Self::BadData(_) => "CHAIN_BAD_DATA",
        }
    }
}

/// Errors from the peer-to-peer layer.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A swarm command could not be delivered.
    #[error("network channel closed: {0}")]
    ChannelClosed(String),
    /// A peer request failed or timed out.
    #[error("peer request failed: {0}")]
    RequestFailed(String),
    /// A handshake was rejected.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
}

impl ErrorCode for NetworkError {
    fn code(&self) -> &'static str {
        match self {
            Self::ChannelClosed(_) => "NET_CHANNEL_CLOSED",
            Self::RequestFailed(_) => "NET_REQUEST_FAILED",
            Self::HandshakeRejected(_) => "NET_HANDSHAKE_REJECTED",
        }
    }
}

/// Errors from the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No synced peer was available to serve the request.
    #[error("no synced peer available for {0}")]
    NoPeer(String),
    /// All fetch attempts were exhausted.
    #[error("sync exhausted after {attempts} attempts: {reason}")]
    Exhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The last failure observed.
        reason: String,
    },
    /// The fetched data failed verification.
    #[error("fetched data failed verification: {0}")]
    BadData(String),
}

impl ErrorCode for SyncError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoPeer(_) => "SYNC_NO_PEER",
            Self::Exhausted { .. } => "SYNC_EXHAUSTED",
            Self::BadData(_) => "SYNC_BAD_DATA",
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        AppError::Transient(e.to_string())
    }
}
