//! At-rest encryption for segment payloads
//!
//! AES-256-CBC with PKCS#7 padding. Every blob carries its own random IV:
//!
//! ```text
//! [16-byte IV][ciphertext, padded to a multiple of 16 bytes]
//! ```
//!
//! The key is process-wide and read-only. It is provisioned from outside
//! (environment / secret injection); this module never generates or stores one.

use aes::Aes256;
use anyhow::{Context, Result};
use base64::Engine;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// IV length, equal to the AES block size
pub const IV_LEN: usize = 16;

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Symmetric transform applied to segment payloads
#[derive(Clone)]
pub struct SegmentCipher {
    key: [u8; KEY_LEN],
}

impl SegmentCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Parse key material as either 32 raw bytes or base64 of 32 bytes
    pub fn from_key_material(material: &str) -> Result<Self, CryptoError> {
        if material.len() == KEY_LEN {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(material.as_bytes());
            return Ok(Self::new(key));
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(material.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not 32 bytes and not base64: {}", e)))?;

        let key: [u8; KEY_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, v.len()))
        })?;

        Ok(Self::new(key))
    }

    /// Load key material from an environment variable
    pub fn from_env(var: &str) -> Result<Self> {
        let material = std::env::var(var)
            .with_context(|| format!("Encryption key variable {} is not set", var))?;

        Self::from_key_material(&material)
            .with_context(|| format!("Invalid encryption key in {}", var))
    }

    /// Encrypt with a fresh random IV, returning `IV || ciphertext`
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext =
            Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        blob
    }

    /// Split the IV prefix off `blob` and decrypt the rest
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < IV_LEN {
            return Err(CryptoError::MalformedInput {
                len: blob.len(),
                min: IV_LEN,
            });
        }

        let (iv, ciphertext) = blob.split_at(IV_LEN);

        // PKCS#7 always emits at least one block
        if ciphertext.is_empty() || ciphertext.len() % IV_LEN != 0 {
            return Err(CryptoError::DecryptionFailure);
        }

        let mut iv_block = [0u8; IV_LEN];
        iv_block.copy_from_slice(iv);

        Aes256CbcDec::new(&self.key.into(), &iv_block.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailure)
    }
}

impl fmt::Debug for SegmentCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentCipher").finish_non_exhaustive()
    }
}
