//! Record protection (AEAD).
//!
//! A [`RecordCipher`] seals and opens records for one direction of a
//! session. Nonces follow the TLS 1.3 construction: the per-direction IV
//! XORed with the big-endian record sequence number.

use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{
    aead::{Aead as AeadTrait, KeyInit, Payload},
    ChaCha20Poly1305,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{CipherSuite, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// A symmetric record key.
///
/// Automatically zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey(Vec<u8>);

impl AeadKey {
    /// Create a new AEAD key from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AeadKey({} bytes)", self.0.len())
    }
}

/// A record nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Derive the nonce for record `seq` from a direction's IV.
    pub fn for_record(iv: &[u8; NONCE_SIZE], seq: u64) -> Self {
        let mut nonce = *iv;
        for (n, s) in nonce[NONCE_SIZE - 8..].iter_mut().zip(seq.to_be_bytes()) {
            *n ^= s;
        }
        Self(nonce)
    }

    /// Get the raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

enum Algorithm {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
    ChaCha(ChaCha20Poly1305),
}

/// AEAD state for one direction of a session.
pub struct RecordCipher {
    algorithm: Algorithm,
    iv: [u8; NONCE_SIZE],
}

impl RecordCipher {
    /// Create a cipher for `suite` from a key and IV.
    pub fn new(suite: CipherSuite, key: &AeadKey, iv: [u8; NONCE_SIZE]) -> Result<Self> {
        if key.as_bytes().len() != suite.key_len() {
            return Err(Error::Buffer {
                expected: suite.key_len(),
                actual: key.as_bytes().len(),
            });
        }
        let algorithm = match suite {
            CipherSuite::Aes128Gcm => Algorithm::Aes128(
                Aes128Gcm::new_from_slice(key.as_bytes())
                    .map_err(|_| Error::crypto("invalid AES-128-GCM key length"))?,
            ),
            CipherSuite::Aes256Gcm => Algorithm::Aes256(
                Aes256Gcm::new_from_slice(key.as_bytes())
                    .map_err(|_| Error::crypto("invalid AES-256-GCM key length"))?,
            ),
            CipherSuite::ChaCha20Poly1305 => Algorithm::ChaCha(
                ChaCha20Poly1305::new_from_slice(key.as_bytes())
                    .map_err(|_| Error::crypto("invalid ChaCha20-Poly1305 key length"))?,
            ),
        };
        Ok(Self { algorithm, iv })
    }

    /// Encrypt a record body.
    ///
    /// Returns ciphertext || tag (16 bytes appended).
    pub fn seal(&self, seq: u64, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::for_record(&self.iv, seq);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let sealed = match &self.algorithm {
            Algorithm::Aes128(c) => c.encrypt(nonce.as_bytes().into(), payload),
            Algorithm::Aes256(c) => c.encrypt(nonce.as_bytes().into(), payload),
            Algorithm::ChaCha(c) => c.encrypt(nonce.as_bytes().into(), payload),
        };
        sealed.map_err(|_| Error::crypto("encryption failed"))
    }

    /// Decrypt a record body.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails (wrong key, wrong sequence
    /// number, tampered data).
    pub fn open(&self, seq: u64, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::Buffer {
                expected: TAG_SIZE,
                actual: ciphertext.len(),
            });
        }
        let nonce = Nonce::for_record(&self.iv, seq);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let opened = match &self.algorithm {
            Algorithm::Aes128(c) => c.decrypt(nonce.as_bytes().into(), payload),
            Algorithm::Aes256(c) => c.decrypt(nonce.as_bytes().into(), payload),
            Algorithm::ChaCha(c) => c.decrypt(nonce.as_bytes().into(), payload),
        };
        opened.map_err(|_| Error::crypto(format!("record {} failed authentication", seq)))
    }
}

/// Calculate the ciphertext length for a given plaintext length.
pub const fn ciphertext_len(plaintext_len: usize) -> usize {
    plaintext_len + TAG_SIZE
}
