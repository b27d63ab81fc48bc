//! At-rest encryption for OAuth access and refresh tokens.
//!
//! Tokens are sealed with AES-256-GCM under a 32-byte key supplied as 64 hex
//! characters. The stored form is `base64(nonce || ciphertext)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum TokenCipherError {
    #[error("invalid token encryption key length: {0} bytes")]
    InvalidKeyLength(usize),
    #[error("invalid ciphertext length: {0}")]
    InvalidCiphertextLength(usize),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("decrypted token is not UTF-8")]
    Utf8,
    #[error("token encryption failure")]
    Aead,
}

/// Symmetric cipher for tokens stored in `bank_connections`.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; KEY_LEN],
}

impl TokenCipher {
    /// Parse a 64-character hex key.
    pub fn from_hex(value: &str) -> Result<Self, TokenCipherError> {
        let bytes = hex::decode(value.trim())?;
        let key: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TokenCipherError::InvalidKeyLength(bytes.len()))?;
        Ok(Self { key })
    }

    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, TokenCipherError> {
        let cipher = self.cipher()?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| TokenCipherError::Aead)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, TokenCipherError> {
        let data = BASE64.decode(encoded)?;
        if data.len() <= NONCE_LEN {
            return Err(TokenCipherError::InvalidCiphertextLength(data.len()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenCipherError::Aead)?;
        String::from_utf8(plaintext).map_err(|_| TokenCipherError::Utf8)
    }

    fn cipher(&self) -> Result<Aes256Gcm, TokenCipherError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| TokenCipherError::InvalidKeyLength(KEY_LEN))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(<redacted>)")
    }
}
