use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use crate::key_provider::KeyMaterial;

/// Leading byte of every token; bump when the layout changes.
pub const TOKEN_VERSION: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("token is not valid base64: {0}")]
    Encoding(String),
    #[error("token too short ({0} bytes)")]
    Malformed(usize),
    #[error("unsupported token version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("authentication failed (wrong key or tampered token)")]
    Authentication,
    #[error("encrypt failed: {0}")]
    Encrypt(String),
}

/// AES-256-GCM sealing into self-contained text tokens:
/// `base64url(version || nonce || ciphertext+tag)`.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(material: &KeyMaterial) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(&material.bytes)
            .map_err(|e| CipherError::Encrypt(format!("cipher init failed: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypt under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut raw = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        raw.push(TOKEN_VERSION);
        raw.extend_from_slice(nonce.as_slice());
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    pub fn open(&self, token: &str) -> Result<Vec<u8>, CipherError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CipherError::Encoding(e.to_string()))?;
        self.open_raw(&raw)
    }

    fn open_raw(&self, raw: &[u8]) -> Result<Vec<u8>, CipherError> {
        if raw.len() < HEADER_LEN + TAG_LEN {
            return Err(CipherError::Malformed(raw.len()));
        }
        if raw[0] != TOKEN_VERSION {
            return Err(CipherError::UnsupportedVersion(raw[0]));
        }
        let nonce = Nonce::from_slice(&raw[1..HEADER_LEN]);
        self.cipher
            .decrypt(nonce, &raw[HEADER_LEN..])
            .map_err(|_| CipherError::Authentication)
    }
}
