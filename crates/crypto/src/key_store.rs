// Path: crates/crypto/src/key_store.rs
//! Passphrase storage for private keys.
//!
//! Layout:
//! - KDF: Argon2id over a random 16-byte salt → 32-byte key.
//! - AEAD: ChaCha20-Poly1305; the random 12-byte nonce is prepended to the
//!   ciphertext.
//! - On disk: JSON `{"s": hex(salt), "c": hex(nonce || ciphertext)}` at
//!   `<dataDir>/keystores/.goml/<name>.json`.

use crate::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEK_LEN: usize = 32;
const KDF_MEM_KIB: u32 = 64 * 1024;
const KDF_ITERS: u32 = 3;
const KDF_LANES: u32 = 4;

/// A container for sensitive data that zeroizes on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(pub Vec<u8>);

fn derive_kek(passphrase: &str, salt: &[u8]) -> Result<[u8; KEK_LEN], CryptoError> {
    let params = Params::new(KDF_MEM_KIB, KDF_ITERS, KDF_LANES, Some(KEK_LEN))
        .map_err(|e| CryptoError::KdfFailure(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut kek = [0u8; KEK_LEN];
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut kek)
        .map_err(|e| CryptoError::KdfFailure(e.to_string()))?;
    Ok(kek)
}

/// Encrypts raw key bytes under a passphrase. Returns
/// `(nonce || ciphertext, salt)`.
pub fn encrypt_privkey(
    secret: &[u8],
    passphrase: &str,
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let mut salt = vec![0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let kek = derive_kek(passphrase, &salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&kek));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), secret)
        .map_err(|e| CryptoError::OperationFailed(format!("encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok((out, salt))
}

/// Decrypts `(nonce || ciphertext)` produced by [`encrypt_privkey`].
pub fn decrypt_privkey(
    ciphertext: &[u8],
    passphrase: &str,
    salt: &[u8],
) -> Result<SensitiveBytes, CryptoError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(CryptoError::InvalidInput("ciphertext too short".into()));
    }
    let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
    let kek = derive_kek(passphrase, salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&kek));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), body)
        .map_err(|_| {
            CryptoError::OperationFailed("decryption failed (wrong password or corrupted file)".into())
        })?;
    Ok(SensitiveBytes(plaintext))
}

/// The on-disk keystore document.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyStoreFile {
    /// Hex salt.
    pub s: String,
    /// Hex `nonce || ciphertext`.
    pub c: String,
}

impl KeyStoreFile {
    /// Encrypts a private key into a storable document.
    pub fn seal(secret: &[u8], passphrase: &str) -> Result<Self, CryptoError> {
        let (ciphertext, salt) = encrypt_privkey(secret, passphrase)?;
        Ok(Self {
            s: hex::encode(salt),
            c: hex::encode(ciphertext),
        })
    }

    /// Decrypts the stored private key.
    pub fn open(&self, passphrase: &str) -> Result<SensitiveBytes, CryptoError> {
        let salt =
            hex::decode(&self.s).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let ciphertext =
            hex::decode(&self.c).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        decrypt_privkey(&ciphertext, passphrase, &salt)
    }

    /// Writes the document as JSON.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| CryptoError::OperationFailed(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| CryptoError::OperationFailed(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CryptoError::OperationFailed(e.to_string()))
    }

    /// Reads a document from disk.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let raw =
            std::fs::read(path).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }
}
