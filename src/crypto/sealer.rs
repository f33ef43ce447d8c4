// ABOUTME: Secret sealing with AES-256-GCM, a fresh random nonce per call and base64 storage form
// ABOUTME: Opening fails closed on any tamper, truncation or encoding error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;

use base64::engine::general_purpose;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::errors::{AppError, AppResult};

/// Required key length in bytes
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Seals and opens secrets. Stateless apart from the key; safe to share across tasks.
pub struct SecretSealer {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for SecretSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSealer")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

impl SecretSealer {
    /// Build from raw key bytes
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless the key is exactly 32 bytes
    pub fn new(key_bytes: &[u8]) -> AppResult<Self> {
        if key_bytes.len() != ENCRYPTION_KEY_LEN {
            return Err(AppError::config(format!(
                "Encryption key must be {ENCRYPTION_KEY_LEN} bytes, got {}",
                key_bytes.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes)
            .map_err(|e| AppError::config(format!("Failed to create encryption key: {e}")))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Build from the base64 form used in configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the value is not base64 or not 32 bytes
    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let bytes = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| AppError::config(format!("Encryption key is not valid base64: {e}")))?,
        );
        Self::new(&bytes)
    }

    /// Encrypt `plaintext`; output is `base64(nonce || ciphertext || tag)`
    ///
    /// # Errors
    ///
    /// Returns an internal error if randomness or encryption fails
    pub fn seal(&self, plaintext: &str) -> AppResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|e| AppError::internal(format!("Failed to generate nonce: {e}")))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        // Sized for the tag so the plaintext copy is never reallocated before it is wiped
        let mut data = Zeroizing::new(Vec::with_capacity(plaintext.len() + AES_256_GCM.tag_len()));
        data.extend_from_slice(plaintext.as_bytes());
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut *data)
            .map_err(|e| AppError::internal(format!("Failed to seal secret: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + data.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&data);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypt a value produced by [`Self::seal`]
    ///
    /// # Errors
    ///
    /// Returns an internal error on malformed input or failed authentication; no partial
    /// plaintext is ever returned
    pub fn open(&self, sealed: &str) -> AppResult<Zeroizing<String>> {
        let combined = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|e| AppError::internal(format!("Sealed value is not valid base64: {e}")))?;

        if combined.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(AppError::internal("Sealed value is too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|e| AppError::internal(format!("Invalid nonce: {e}")))?;

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), buffer.as_mut_slice())
            .map_err(|_| AppError::internal("Sealed value failed authentication"))?;

        let text = std::str::from_utf8(plaintext)
            .map_err(|e| AppError::internal(format!("Opened value is not UTF-8: {e}")))?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}

/// Generate a fresh random 32-byte key
#[must_use]
pub fn generate_encryption_key() -> [u8; ENCRYPTION_KEY_LEN] {
    use rand::Rng;
    let mut key = [0u8; ENCRYPTION_KEY_LEN];
    rand::thread_rng().fill(&mut key);
    key
}
