//! Symmetric authenticated-encryption tokens

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload as AeadPayload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Duration;
use log::debug;
use rand::RngCore;
use thiserror::Error;

pub mod payload;

pub use payload::{Payload, TokenKind};

/// Version and purpose prefix, also bound to the ciphertext as associated data
pub const TOKEN_HEADER: &str = "v1.local.";
/// AES-256 key length in bytes
pub const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Errors that can occur while creating or verifying tokens
#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("invalid key size: must be exactly {KEY_SIZE} bytes, got {0}")]
    InvalidKeySize(usize),
    #[error("token is invalid")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("failed to encrypt token: {0}")]
    Encryption(String),
}

/// Creates and verifies encrypted tokens. Stateless, cheap to clone.
#[derive(Clone)]
pub struct TokenMaker {
    cipher: Aes256Gcm,
}

impl TokenMaker {
    /// Create a token maker from the raw bytes of `symmetric_key`
    pub fn new(symmetric_key: &str) -> Result<Self, TokenError> {
        let key = symmetric_key.as_bytes();
        if key.len() != KEY_SIZE {
            return Err(TokenError::InvalidKeySize(key.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| TokenError::InvalidKeySize(key.len()))?;
        Ok(Self { cipher })
    }

    /// Issue a `kind` token for `subject` valid for `duration`
    pub fn create_token(
        &self,
        subject: &str,
        kind: TokenKind,
        duration: Duration,
    ) -> Result<(String, Payload), TokenError> {
        let payload = Payload::new(subject, kind, duration);
        let plaintext =
            serde_json::to_vec(&payload).map_err(|e| TokenError::Encryption(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                AeadPayload {
                    msg: &plaintext,
                    aad: TOKEN_HEADER.as_bytes(),
                },
            )
            .map_err(|e| TokenError::Encryption(e.to_string()))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend(ciphertext);

        debug!("Created token {} expiring at {}", payload.id, payload.expired_at);
        Ok((
            format!("{TOKEN_HEADER}{}", URL_SAFE_NO_PAD.encode(sealed)),
            payload,
        ))
    }

    /// Decrypt `token` and check that it has not expired
    pub fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        let encoded = token
            .strip_prefix(TOKEN_HEADER)
            .ok_or(TokenError::InvalidToken)?;
        let sealed = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::InvalidToken)?;
        if sealed.len() <= NONCE_SIZE {
            return Err(TokenError::InvalidToken);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                AeadPayload {
                    msg: ciphertext,
                    aad: TOKEN_HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::InvalidToken)?;

        let payload: Payload =
            serde_json::from_slice(&plaintext).map_err(|_| TokenError::InvalidToken)?;
        if payload.is_expired() {
            return Err(TokenError::ExpiredToken);
        }
        Ok(payload)
    }
}
