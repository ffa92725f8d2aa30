// Path: crates/networking/src/libp2p/protocol.rs

//! The point-to-point wire protocol: signed request frames, responses, and
//! the length-prefixed codec that carries them.

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::Codec;
use mlayer_crypto::sign::ed25519::{self, Ed25519KeyPair};
use mlayer_types::codec;
use mlayer_types::entities::EntityModel;
use mlayer_types::error::{CryptoError, NetworkError};
use serde::{Deserialize, Serialize};

/// Point-to-point verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum P2pAction {
    /// Fetch one event by path.
    #[default]
    GetEvent,
    /// Fetch an entity's current state (and its winning event).
    GetState,
    /// Fetch the node's intra-cluster certificate.
    GetCert,
    /// Hand an event directly to a peer's ingress.
    PublishEvent,
}

impl From<P2pAction> for u8 {
    fn from(a: P2pAction) -> u8 {
        match a {
            P2pAction::GetEvent => 1,
            P2pAction::GetState => 2,
            P2pAction::GetCert => 3,
            P2pAction::PublishEvent => 4,
        }
    }
}

impl TryFrom<u8> for P2pAction {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(P2pAction::GetEvent),
            2 => Ok(P2pAction::GetState),
            3 => Ok(P2pAction::GetCert),
            4 => Ok(P2pAction::PublishEvent),
            other => Err(format!("unknown p2p action: {other}")),
        }
    }
}

/// A state fetch query: `(entity type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateQuery {
    /// Entity id.
    #[serde(rename = "id")]
    pub id: String,
    /// Entity model.
    #[serde(rename = "m")]
    pub model: EntityModel,
}

/// A signed request frame. The signer's public key travels with the frame so
/// the receiver can authenticate without a prior handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2pPayload {
    /// The verb.
    #[serde(rename = "a", default)]
    pub action: P2pAction,
    /// Verb-specific canonical payload bytes.
    #[serde(rename = "d", default, with = "serde_bytes")]
    pub payload: Vec<u8>,
    /// Ed25519 signature over the frame with this field cleared.
    #[serde(rename = "sig", default, with = "serde_bytes")]
    pub signature: Vec<u8>,
    /// The sender's Ed25519 public key.
    #[serde(rename = "sigr", default, with = "serde_bytes")]
    pub signer: Vec<u8>,
    /// Milliseconds since epoch at send time.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
}

impl P2pPayload {
    /// Builds an unsigned frame.
    pub fn new(action: P2pAction, payload: Vec<u8>, timestamp: u64) -> Self {
        Self {
            action,
            payload,
            signature: Vec::new(),
            signer: Vec::new(),
            timestamp,
        }
    }

    fn signing_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        let mut unsigned = self.clone();
        unsigned.signature = Vec::new();
        codec::to_bytes_canonical(&unsigned)
            .map_err(|e| NetworkError::RequestFailed(e.to_string()))
    }

    /// Signs the frame, stamping the signer key.
    pub fn sign(&mut self, keypair: &Ed25519KeyPair) -> Result<(), NetworkError> {
        self.signer = keypair.public_key().to_vec();
        let bytes = self.signing_bytes()?;
        self.signature = keypair.sign(&bytes).to_vec();
        Ok(())
    }

    /// Verifies the embedded signature against the embedded signer key.
    pub fn verify(&self) -> Result<bool, CryptoError> {
        if self.signature.is_empty() || self.signer.is_empty() {
            return Ok(false);
        }
        let bytes = self
            .signing_bytes()
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        ed25519::verify(&self.signer, &bytes, &self.signature)
    }
}

/// The response to a point-to-point request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2pResponse {
    /// The verb being answered.
    #[serde(rename = "a", default)]
    pub action: P2pAction,
    /// Canonical event bytes (or certificate bytes for `GetCert`); empty
    /// when the peer has nothing.
    #[serde(rename = "e", default, with = "serde_bytes")]
    pub event: Vec<u8>,
    /// Canonical state bytes accompanying the event.
    #[serde(rename = "sts", default)]
    pub states: Vec<serde_bytes::ByteBuf>,
}

impl P2pResponse {
    /// An empty response for a verb.
    pub fn empty(action: P2pAction) -> Self {
        Self {
            action,
            event: Vec::new(),
            states: Vec::new(),
        }
    }

    /// True when the response carries no event.
    pub fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

// --- Length-prefixed transport framing (unsigned varint) ---

const MAX_REQUEST_BYTES: usize = 1_000_000;
const MAX_RESPONSE_BYTES: usize = 100 * 1024 * 1024;

async fn read_length_prefixed<T: AsyncRead + Unpin + Send>(
    io: &mut T,
    max_len: usize,
) -> std::io::Result<Vec<u8>> {
    let mut len: u64 = 0;
    let mut shift = 0;
    loop {
        if shift >= 70 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "varint too long",
            ));
        }
        let mut b = [0u8; 1];
        io.read_exact(&mut b).await?;
        len |= ((b[0] & 0x7f) as u64) << shift;
        shift += 7;
        if (b[0] & 0x80) == 0 {
            break;
        }
    }
    if len > max_len as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "message too large",
        ));
    }
    let mut vec = vec![0u8; len as usize];
    io.read_exact(&mut vec).await?;
    Ok(vec)
}

async fn write_length_prefixed<T: AsyncWrite + Unpin + Send>(
    io: &mut T,
    data: Vec<u8>,
) -> std::io::Result<()> {
    let mut len = data.len() as u64;
    let mut encoded = [0u8; 10];
    let mut i = 0;
    loop {
        let mut byte = (len & 0x7f) as u8;
        len >>= 7;
        if len != 0 {
            byte |= 0x80;
        }
        encoded[i] = byte;
        i += 1;
        if len == 0 {
            break;
        }
    }
    io.write_all(&encoded[..i]).await?;
    io.write_all(&data).await?;
    Ok(())
}

/// Codec carrying canonical-encoded frames over the request/response
/// protocol.
#[derive(Debug, Clone, Default)]
pub struct DataCodec;

#[async_trait::async_trait]
impl Codec for DataCodec {
    type Protocol = &'static str;
    type Request = P2pPayload;
    type Response = P2pResponse;

    async fn read_request<T: AsyncRead + Unpin + Send>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
    ) -> std::io::Result<Self::Request> {
        let vec = read_length_prefixed(io, MAX_REQUEST_BYTES).await?;
        codec::from_bytes_canonical(&vec)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    async fn read_response<T: AsyncRead + Unpin + Send>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
    ) -> std::io::Result<Self::Response> {
        let vec = read_length_prefixed(io, MAX_RESPONSE_BYTES).await?;
        codec::from_bytes_canonical(&vec)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    async fn write_request<T: AsyncWrite + Unpin + Send>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        req: Self::Request,
    ) -> std::io::Result<()> {
        let vec = codec::to_bytes_canonical(&req)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        write_length_prefixed(io, vec).await
    }

    async fn write_response<T: AsyncWrite + Unpin + Send>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        res: Self::Response,
    ) -> std::io::Result<()> {
        let vec = codec::to_bytes_canonical(&res)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        write_length_prefixed(io, vec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sign_verify_roundtrip() {
        let keypair = Ed25519KeyPair::generate();
        let mut frame = P2pPayload::new(P2pAction::GetEvent, b"path".to_vec(), 1234);
        frame.sign(&keypair).unwrap();
        assert!(frame.verify().unwrap());
        assert_eq!(frame.signer, keypair.public_key().to_vec());
    }

    #[test]
    fn tampered_frame_fails_verification() {
        let keypair = Ed25519KeyPair::generate();
        let mut frame = P2pPayload::new(P2pAction::GetState, b"query".to_vec(), 1234);
        frame.sign(&keypair).unwrap();
        frame.timestamp += 1;
        assert!(!frame.verify().unwrap());
    }

    #[test]
    fn unsigned_frame_does_not_verify() {
        let frame = P2pPayload::new(P2pAction::GetCert, vec![b'0'], 1);
        assert!(!frame.verify().unwrap());
    }

    #[test]
    fn action_codes_match_wire_protocol() {
        assert_eq!(u8::from(P2pAction::GetEvent), 1);
        assert_eq!(u8::from(P2pAction::GetState), 2);
        assert_eq!(u8::from(P2pAction::GetCert), 3);
        assert_eq!(u8::from(P2pAction::PublishEvent), 4);
    }

    #[test]
    fn frames_roundtrip_canonically() {
        let keypair = Ed25519KeyPair::generate();
        let mut frame = P2pPayload::new(P2pAction::GetEvent, b"abc".to_vec(), 77);
        frame.sign(&keypair).unwrap();
        let bytes = codec::to_bytes_canonical(&frame).unwrap();
        let back: P2pPayload = codec::from_bytes_canonical(&bytes).unwrap();
        assert_eq!(frame, back);
        assert!(back.verify().unwrap());
    }
}
