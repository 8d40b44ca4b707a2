//! Chunked stream encryption for resource content
//!
//! Uses AES-256-GCM for authenticated encryption. Content is framed into
//! fixed-size plaintext chunks; chunk `n` is sealed under the nonce
//! `nonce_prefix (8 bytes) || n as u32 big-endian`, and each ciphertext chunk
//! carries its own 16-byte tag. The counter in the nonce pins chunks to their
//! position, so reordered or truncated ciphertext fails authentication.
//!
//! Only the final chunk may be shorter than [`CHUNK_SIZE`]; empty content
//! encrypts to an empty blob.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use bytes::Bytes;

use core_registry::KeyMaterial;

use crate::error::{PipelineError, Result};

/// Plaintext bytes per encrypted chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// GCM authentication tag length appended to every ciphertext chunk.
pub const TAG_SIZE: usize = 16;

fn build_cipher(key_material: &KeyMaterial) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key_material.key())
        .map_err(|e| PipelineError::Encryption(format!("invalid key length: {}", e)))
}

fn chunk_nonce(prefix: &[u8; 8], counter: u32) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(prefix);
    nonce[8..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Sequential chunk encryptor for one resource's content stream.
pub struct StreamEncryptor {
    cipher: Aes256Gcm,
    nonce_prefix: [u8; 8],
    counter: u32,
}

impl StreamEncryptor {
    pub fn new(key_material: &KeyMaterial) -> Result<Self> {
        Ok(Self {
            cipher: build_cipher(key_material)?,
            nonce_prefix: *key_material.nonce_prefix(),
            counter: 0,
        })
    }

    /// Seal the next plaintext chunk. Chunks must be fed in stream order.
    pub fn seal_chunk(&mut self, plaintext: &[u8]) -> Result<Bytes> {
        let nonce = chunk_nonce(&self.nonce_prefix, self.counter);
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| PipelineError::Encryption("chunk counter overflow".to_string()))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| PipelineError::Encryption(format!("chunk encryption failed: {}", e)))?;

        Ok(Bytes::from(ciphertext))
    }
}

/// Sequential chunk decryptor; the inverse of [`StreamEncryptor`].
pub struct StreamDecryptor {
    cipher: Aes256Gcm,
    nonce_prefix: [u8; 8],
    counter: u32,
}

impl StreamDecryptor {
    pub fn new(key_material: &KeyMaterial) -> Result<Self> {
        Ok(Self {
            cipher: build_cipher(key_material)?,
            nonce_prefix: *key_material.nonce_prefix(),
            counter: 0,
        })
    }

    /// Open the next ciphertext chunk (plaintext chunk + tag), in order.
    pub fn open_chunk(&mut self, ciphertext: &[u8]) -> Result<Bytes> {
        if ciphertext.len() < TAG_SIZE {
            return Err(PipelineError::Encryption(
                "ciphertext chunk shorter than authentication tag".to_string(),
            ));
        }

        let nonce = chunk_nonce(&self.nonce_prefix, self.counter);
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| PipelineError::Encryption("chunk counter overflow".to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| PipelineError::Encryption("chunk authentication failed".to_string()))?;

        Ok(Bytes::from(plaintext))
    }

    /// Decrypt a whole blob produced by the chunked encryptor.
    pub fn open_all(&mut self, blob: &[u8]) -> Result<Vec<u8>> {
        let mut plaintext = Vec::new();
        for chunk in blob.chunks(CHUNK_SIZE + TAG_SIZE) {
            plaintext.extend_from_slice(&self.open_chunk(chunk)?);
        }
        Ok(plaintext)
    }
}

/// Ciphertext size for a given plaintext size under the chunked framing.
pub fn encrypted_len(plaintext_len: u64) -> u64 {
    if plaintext_len == 0 {
        return 0;
    }
    let chunks = plaintext_len.div_ceil(CHUNK_SIZE as u64);
    plaintext_len + chunks * TAG_SIZE as u64
}
