//! X25519 key exchange primitives.
//!
//! Ephemeral secrets are generated from a caller-supplied byte source
//! rather than a thread-local RNG, so that every byte of key material a
//! handshake draws passes through the session's randomness proxy.

use rand_core::RngCore;
use x25519_dalek::{PublicKey as DalekPublic, SharedSecret as DalekShared, StaticSecret as DalekStatic};
use zeroize::Zeroizing;

use crate::crypto::PUBLIC_KEY_SIZE;

/// Bytes of randomness consumed to generate one ephemeral secret.
pub const SECRET_SIZE: usize = 32;

/// An ephemeral (single-use) X25519 secret key.
///
/// Zeroized on drop by the underlying dalek type.
pub struct EphemeralSecret(DalekStatic);

impl EphemeralSecret {
    /// Generate a secret from exactly [`SECRET_SIZE`] bytes of `rng`.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = Zeroizing::new([0u8; SECRET_SIZE]);
        rng.fill_bytes(&mut *bytes);
        Self(DalekStatic::from(*bytes))
    }

    /// Perform X25519 Diffie-Hellman key agreement.
    pub fn diffie_hellman(self, their_public: &PublicKey) -> SharedSecret {
        SharedSecret(self.0.diffie_hellman(&their_public.0))
    }
}

impl From<&EphemeralSecret> for PublicKey {
    fn from(secret: &EphemeralSecret) -> Self {
        PublicKey(DalekPublic::from(&secret.0))
    }
}

/// An X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(DalekPublic);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(DalekPublic::from(bytes))
    }

    /// Get the raw bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }
}

/// The result of an X25519 Diffie-Hellman key exchange.
///
/// Zeroized on drop by the underlying dalek type.
pub struct SharedSecret(DalekShared);

impl SharedSecret {
    /// Get the raw shared secret bytes.
    ///
    /// # Security
    ///
    /// This should be fed into a KDF (like HKDF) before use as a key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}
