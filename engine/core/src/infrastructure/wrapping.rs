// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WrapError {
    #[error("No wrapping key registered for KAS {0}")]
    UnknownKas(String),
    #[error("Key wrap failed for KAS {0}")]
    Wrap(String),
    #[error("Key unwrap failed for KAS {0}")]
    Unwrap(String),
}

/// Wraps content keys for a target KAS at seal time. The unwrap direction is
/// what the KAS itself performs at release time; it is exposed here so
/// co-located KAS deployments and test fakes can share the implementation.
pub trait ContentKeyWrapper: Send + Sync {
    fn algorithm(&self) -> &'static str;
    fn wrap_key(&self, kas_id: &str, dek: &[u8]) -> Result<String, WrapError>;
    fn unwrap_key(&self, kas_id: &str, wrapped: &str) -> Result<Vec<u8>, WrapError>;
}

/// AES-256-GCM key wrapping under a per-KAS key-encryption key. Wire form is
/// base64(nonce || ciphertext || tag).
#[derive(Default)]
pub struct AesGcmKeyWrapper {
    keks: HashMap<String, [u8; 32]>,
}

const NONCE_LEN: usize = 12;

impl AesGcmKeyWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kas_id: impl Into<String>, kek: [u8; 32]) -> Self {
        self.keks.insert(kas_id.into(), kek);
        self
    }

    fn cipher(&self, kas_id: &str) -> Result<Aes256Gcm, WrapError> {
        let kek = self
            .keks
            .get(kas_id)
            .ok_or_else(|| WrapError::UnknownKas(kas_id.to_string()))?;
        Aes256Gcm::new_from_slice(kek).map_err(|_| WrapError::Wrap(kas_id.to_string()))
    }
}

impl ContentKeyWrapper for AesGcmKeyWrapper {
    fn algorithm(&self) -> &'static str {
        "AES-256-GCM"
    }

    fn wrap_key(&self, kas_id: &str, dek: &[u8]) -> Result<String, WrapError> {
        let cipher = self.cipher(kas_id)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, dek)
            .map_err(|_| WrapError::Wrap(kas_id.to_string()))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    fn unwrap_key(&self, kas_id: &str, wrapped: &str) -> Result<Vec<u8>, WrapError> {
        let cipher = self.cipher(kas_id)?;
        let raw = STANDARD
            .decode(wrapped)
            .map_err(|_| WrapError::Unwrap(kas_id.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(WrapError::Unwrap(kas_id.to_string()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| WrapError::Unwrap(kas_id.to_string()))
    }
}
