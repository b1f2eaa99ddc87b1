//! Key schedule.
//!
//! Uses HKDF-SHA256 to expand the X25519 shared secret into per-direction
//! record keys, IVs and Finished keys, salted with the handshake transcript.

use hkdf::Hkdf as HkdfImpl;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{AeadKey, CipherSuite, RecordCipher, SharedSecret, HASH_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};

/// HKDF key derivation using SHA-256.
pub struct Hkdf {
    prk: HkdfImpl<Sha256>,
}

impl Hkdf {
    /// Create a new HKDF instance from input keying material.
    ///
    /// # Arguments
    ///
    /// * `salt` - Optional salt (recommended for better security)
    /// * `ikm` - Input keying material (e.g., shared secret from DH)
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        Self {
            prk: HkdfImpl::new(salt, ikm),
        }
    }

    /// Expand the PRK to produce output keying material.
    pub fn expand(&self, info: &[u8], len: usize) -> Result<Vec<u8>> {
        let mut okm = vec![0u8; len];
        self.prk
            .expand(info, &mut okm)
            .map_err(|_| Error::crypto("HKDF expansion failed"))?;
        Ok(okm)
    }

    /// Expand to a fixed-size array.
    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N]> {
        let mut okm = [0u8; N];
        self.prk
            .expand(info, &mut okm)
            .map_err(|_| Error::crypto("HKDF expansion failed"))?;
        Ok(okm)
    }
}

/// Traffic keys for both directions of a session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TrafficKeys {
    client_key: Vec<u8>,
    server_key: Vec<u8>,
    client_iv: [u8; NONCE_SIZE],
    server_iv: [u8; NONCE_SIZE],
    client_finished: [u8; HASH_SIZE],
    server_finished: [u8; HASH_SIZE],
}

impl TrafficKeys {
    /// Derive traffic keys for `suite`.
    ///
    /// # Arguments
    ///
    /// * `shared_secret` - The result of the X25519 exchange
    /// * `transcript` - Hash of ClientHello || ServerHello
    pub fn derive(
        suite: CipherSuite,
        shared_secret: &SharedSecret,
        transcript: &[u8; HASH_SIZE],
    ) -> Result<Self> {
        let hkdf = Hkdf::new(Some(transcript.as_slice()), shared_secret.as_bytes());
        let key_len = suite.key_len();
        let suite_id = suite.to_u16().to_be_bytes();
        let info = |label: &[u8]| [label, suite_id.as_slice()].concat();

        Ok(Self {
            client_key: hkdf.expand(&info(b"tlsfork c key"), key_len)?,
            server_key: hkdf.expand(&info(b"tlsfork s key"), key_len)?,
            client_iv: hkdf.expand_fixed(&info(b"tlsfork c iv"))?,
            server_iv: hkdf.expand_fixed(&info(b"tlsfork s iv"))?,
            client_finished: hkdf.expand_fixed(&info(b"tlsfork c finished"))?,
            server_finished: hkdf.expand_fixed(&info(b"tlsfork s finished"))?,
        })
    }

    /// Cipher protecting client-to-server records.
    pub fn client_cipher(&self, suite: CipherSuite) -> Result<RecordCipher> {
        RecordCipher::new(suite, &AeadKey::from_bytes(self.client_key.clone()), self.client_iv)
    }

    /// Cipher protecting server-to-client records.
    pub fn server_cipher(&self, suite: CipherSuite) -> Result<RecordCipher> {
        RecordCipher::new(suite, &AeadKey::from_bytes(self.server_key.clone()), self.server_iv)
    }

    /// Key for the client's Finished MAC.
    pub fn client_finished_key(&self) -> &[u8; HASH_SIZE] {
        &self.client_finished
    }

    /// Key for the server's Finished MAC.
    pub fn server_finished_key(&self) -> &[u8; HASH_SIZE] {
        &self.server_finished
    }
}

/// SHA-256 over the concatenation of handshake messages.
pub fn transcript_hash(messages: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(message);
    }
    hasher.finalize().into()
}

/// Compute Finished verify data.
pub fn finished_mac(finished_key: &[u8; HASH_SIZE], transcript: &[u8; HASH_SIZE]) -> [u8; HASH_SIZE] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(finished_key)
        .expect("HMAC can take key of any size");
    mac.update(transcript);
    mac.finalize().into_bytes().into()
}

/// Verify Finished verify data in constant time.
pub fn verify_finished(
    finished_key: &[u8; HASH_SIZE],
    transcript: &[u8; HASH_SIZE],
    received: &[u8],
) -> bool {
    let computed = finished_mac(finished_key, transcript);
    received.len() == HASH_SIZE
        && computed
            .iter()
            .zip(received.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
