//! Cryptographic primitives for the built-in engine.
//!
//! This module provides:
//! - X25519 key agreement with secrets drawn from an injected byte source
//! - HKDF-SHA256 key schedule and Finished MACs
//! - Record AEAD (AES-128-GCM, AES-256-GCM, ChaCha20-Poly1305)
//! - The probe-read helper used during key derivation
//!
//! All secret material is zeroized on drop to prevent memory leakage.

mod aead;
pub mod kdf;
mod keys;
pub mod random;
mod suite;

pub use aead::{ciphertext_len, AeadKey, Nonce, RecordCipher};
pub use kdf::{Hkdf, TrafficKeys};
pub use keys::{EphemeralSecret, PublicKey, SharedSecret, SECRET_SIZE};
pub use suite::CipherSuite;

/// Size of AEAD nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of SHA-256 output (transcript hash, Finished MAC)
pub const HASH_SIZE: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_full_key_exchange_and_encryption() {
        let mut rng = StdRng::seed_from_u64(42);

        let client_ephemeral = EphemeralSecret::generate(&mut rng);
        let client_public = PublicKey::from(&client_ephemeral);
        let server_ephemeral = EphemeralSecret::generate(&mut rng);
        let server_public = PublicKey::from(&server_ephemeral);

        let client_shared = client_ephemeral.diffie_hellman(&server_public);
        let server_shared = server_ephemeral.diffie_hellman(&client_public);
        assert_eq!(client_shared.as_bytes(), server_shared.as_bytes());

        let transcript = kdf::transcript_hash(&[client_public.as_bytes(), server_public.as_bytes()]);
        let suite = CipherSuite::ChaCha20Poly1305;
        let client_keys = TrafficKeys::derive(suite, &client_shared, &transcript).unwrap();
        let server_keys = TrafficKeys::derive(suite, &server_shared, &transcript).unwrap();

        let plaintext = b"Hello, secure world!";
        let ciphertext = client_keys
            .client_cipher(suite)
            .unwrap()
            .seal(0, plaintext, b"header")
            .unwrap();
        let decrypted = server_keys
            .client_cipher(suite)
            .unwrap()
            .open(0, &ciphertext, b"header")
            .unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }
}
