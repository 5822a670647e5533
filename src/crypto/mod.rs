//! Cryptographic primitives for Veil Tunnel
//!
//! This module provides:
//! - Password-based key derivation (legacy EVP_BytesToKey scheme)
//! - One-shot AEAD seal/open with self-describing framing
//! - Streaming cipher sessions for chunked connection traffic
//! - Secure random number generation

mod aead;
mod kdf;
mod stream;

pub use aead::{open, seal};
pub use kdf::derive_key;
pub use stream::{CipherSession, Direction};

use ring::aead::{Algorithm, AES_128_GCM, AES_256_GCM, CHACHA20_POLY1305};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the AEAD nonce in bytes (all supported methods)
pub const NONCE_LEN: usize = 12;

/// Length of the AEAD authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Cryptographic errors
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// Input shorter than the minimum framing size. Fatal to the
    /// operation, never retried.
    #[error("malformed input: {len} bytes, need at least {min}")]
    MalformedInput { len: usize, min: usize },

    /// Tag verification failed: wrong key, corruption or tampering.
    /// Never degraded to empty or partial plaintext.
    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("unknown cipher method: {0}")]
    UnknownMethod(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// AEAD cipher method, chosen once per profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CipherMethod {
    Aes256Gcm,
    ChaCha20Poly1305,
    Aes128Gcm,
}

impl CipherMethod {
    /// Symmetric key size in bytes
    pub fn key_len(self) -> usize {
        match self {
            CipherMethod::Aes256Gcm | CipherMethod::ChaCha20Poly1305 => 32,
            CipherMethod::Aes128Gcm => 16,
        }
    }

    /// Nonce size in bytes (12 for every supported method)
    pub fn nonce_len(self) -> usize {
        NONCE_LEN
    }

    /// Authentication tag size in bytes
    pub fn tag_len(self) -> usize {
        TAG_LEN
    }

    pub(crate) fn algorithm(self) -> &'static Algorithm {
        match self {
            CipherMethod::Aes256Gcm => &AES_256_GCM,
            // A real ChaCha20-Poly1305 construction; substituting AES-GCM
            // here would break interop with peers expecting the declared
            // method.
            CipherMethod::ChaCha20Poly1305 => &CHACHA20_POLY1305,
            CipherMethod::Aes128Gcm => &AES_128_GCM,
        }
    }

    /// Canonical display name, as stored in profiles
    pub fn wire_name(self) -> &'static str {
        match self {
            CipherMethod::Aes256Gcm => "AES-256-GCM",
            CipherMethod::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            CipherMethod::Aes128Gcm => "AES-128-GCM",
        }
    }

    /// All supported methods, in preference order
    pub fn supported() -> [CipherMethod; 3] {
        [
            CipherMethod::Aes256Gcm,
            CipherMethod::ChaCha20Poly1305,
            CipherMethod::Aes128Gcm,
        ]
    }
}

impl std::fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl std::str::FromStr for CipherMethod {
    type Err = CryptoError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "aes-256-gcm" => Ok(CipherMethod::Aes256Gcm),
            "chacha20-poly1305" | "chacha20-ietf-poly1305" => Ok(CipherMethod::ChaCha20Poly1305),
            "aes-128-gcm" => Ok(CipherMethod::Aes128Gcm),
            _ => Err(CryptoError::UnknownMethod(name.to_string())),
        }
    }
}

impl TryFrom<String> for CipherMethod {
    type Error = CryptoError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<CipherMethod> for String {
    fn from(method: CipherMethod) -> Self {
        method.wire_name().to_string()
    }
}

/// Generate cryptographically secure random bytes
pub fn random_bytes(buf: &mut [u8]) {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    rng.fill(buf).expect("Failed to generate random bytes");
}

/// Generate a random nonce
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    random_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let mut buf1 = [0u8; 32];
        let mut buf2 = [0u8; 32];
        random_bytes(&mut buf1);
        random_bytes(&mut buf2);
        assert_ne!(buf1, buf2);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "aes-256-gcm".parse::<CipherMethod>().unwrap(),
            CipherMethod::Aes256Gcm
        );
        assert_eq!(
            "ChaCha20-Poly1305".parse::<CipherMethod>().unwrap(),
            CipherMethod::ChaCha20Poly1305
        );
        assert_eq!(
            "chacha20-ietf-poly1305".parse::<CipherMethod>().unwrap(),
            CipherMethod::ChaCha20Poly1305
        );
        assert_eq!(
            "AES-128-GCM".parse::<CipherMethod>().unwrap(),
            CipherMethod::Aes128Gcm
        );
        assert!("rc4-md5".parse::<CipherMethod>().is_err());
    }

    #[test]
    fn test_method_sizes() {
        for method in CipherMethod::supported() {
            assert_eq!(method.nonce_len(), 12);
            assert_eq!(method.tag_len(), 16);
            assert_eq!(method.algorithm().key_len(), method.key_len());
        }
        assert_eq!(CipherMethod::Aes256Gcm.key_len(), 32);
        assert_eq!(CipherMethod::ChaCha20Poly1305.key_len(), 32);
        assert_eq!(CipherMethod::Aes128Gcm.key_len(), 16);
    }
}
