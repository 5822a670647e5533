//! Password-based key derivation
//!
//! Implements the OpenSSL `EVP_BytesToKey` scheme (MD5, no salt, one
//! iteration): keys are built by chaining `MD5(prev_block ‖ password)`
//! until enough material exists. Weak by modern standards, but it is the
//! derivation the deployed servers expect, so it must match exactly.

use md5::{Digest, Md5};

/// Derive a symmetric key of `key_len` bytes from a UTF-8 password.
///
/// Deterministic: the same password and length always produce the same
/// key. An empty password is valid and yields MD5 digests of the empty
/// input chain.
pub fn derive_key(password: &str, key_len: usize) -> Vec<u8> {
    let password = password.as_bytes();
    let mut key = Vec::with_capacity(key_len + Md5::output_size());
    let mut prev: Vec<u8> = Vec::new();

    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }

    key.truncate(key_len);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherMethod;

    #[test]
    fn test_deterministic() {
        let a = derive_key("correct horse battery staple", 32);
        let b = derive_key("correct horse battery staple", 32);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_different_passwords_differ() {
        assert_ne!(derive_key("alpha", 32), derive_key("beta", 32));
    }

    #[test]
    fn test_known_vector_password_32() {
        // First block is MD5("password"), second is MD5(MD5("password") ‖ "password").
        let key = derive_key("password", 32);
        let expected = [
            0x5f, 0x4d, 0xcc, 0x3b, 0x5a, 0xa7, 0x65, 0xd6, 0x1d, 0x83, 0x27, 0xde, 0xb8, 0x82,
            0xcf, 0x99, 0x2b, 0x95, 0x99, 0x0a, 0x91, 0x51, 0x37, 0x4a, 0xbd, 0x8f, 0xf8, 0xc5,
            0xa7, 0xa0, 0xfe, 0x08,
        ];
        assert_eq!(key, expected);
    }

    #[test]
    fn test_empty_password() {
        // MD5 of the empty input
        let key = derive_key("", 16);
        let expected = [
            0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8,
            0x42, 0x7e,
        ];
        assert_eq!(key, expected);
    }

    #[test]
    fn test_truncation_prefix() {
        // A shorter key is a prefix of a longer one from the same password.
        let short = derive_key("secret", 16);
        let long = derive_key("secret", 32);
        assert_eq!(&long[..16], &short[..]);
    }

    #[test]
    fn test_method_key_lengths() {
        for method in CipherMethod::supported() {
            let key = derive_key("pw", method.key_len());
            assert_eq!(key.len(), method.key_len());
        }
    }
}
