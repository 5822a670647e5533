//! One-shot AEAD seal/open
//!
//! Every sealed payload is self-describing: `nonce ‖ ciphertext ‖ tag`,
//! with a fresh random nonce per call and empty associated data. The
//! receiver needs only the payload and the shared key.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey};

use super::{generate_nonce, CipherMethod, CryptoError, NONCE_LEN, TAG_LEN};

pub(crate) fn make_key(method: CipherMethod, key: &[u8]) -> Result<LessSafeKey, CryptoError> {
    if key.len() != method.key_len() {
        return Err(CryptoError::InvalidKeyLength {
            expected: method.key_len(),
            got: key.len(),
        });
    }
    let unbound = UnboundKey::new(method.algorithm(), key)
        .map_err(|_| CryptoError::Encryption("key rejected by cipher".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key`, producing `nonce ‖ ciphertext ‖ tag`.
///
/// A fresh random nonce is generated per call; two seals of the same
/// plaintext never produce the same output.
pub fn seal(method: CipherMethod, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let sealing_key = make_key(method, key)?;
    let nonce_bytes = generate_nonce();

    let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
    out.extend_from_slice(&nonce_bytes);

    let mut in_out = plaintext.to_vec();
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Encryption("AEAD seal failed".to_string()))?;

    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypt a payload produced by [`seal`], returning the plaintext.
///
/// Fails with [`CryptoError::MalformedInput`] if the payload cannot even
/// contain a nonce and tag, and [`CryptoError::AuthenticationFailure`] if
/// tag verification fails (wrong key, corruption or tampering).
pub fn open(method: CipherMethod, key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let min = NONCE_LEN + TAG_LEN;
    if payload.len() < min {
        return Err(CryptoError::MalformedInput {
            len: payload.len(),
            min,
        });
    }

    let opening_key = make_key(method, key)?;
    let nonce = Nonce::try_assume_unique_for_key(&payload[..NONCE_LEN])
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    let mut in_out = payload[NONCE_LEN..].to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    Ok(plaintext.to_vec())
}
