//! Streaming cipher sessions
//!
//! A [`CipherSession`] encrypts or decrypts an ordered sequence of chunks
//! belonging to one connection. Only the first sealed chunk carries the
//! nonce on the wire; after that the session advances its nonce counter
//! per record (little-endian increment), so every chunk is sealed under a
//! unique nonce while the stream stays self-synchronizing from the first
//! record. Each chunk still carries its own authentication tag.

use ring::aead::{Aad, LessSafeKey, Nonce};

use super::aead::make_key;
use super::{generate_nonce, CipherMethod, CryptoError, NONCE_LEN, TAG_LEN};

/// Which half of the duplex stream a session handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outbound: plaintext in, sealed records out
    Seal,
    /// Inbound: sealed records in, plaintext out
    Open,
}

/// Stateful per-connection cipher stream.
///
/// Sessions are unidirectional; a connection holds one `Seal` and one
/// `Open` session. Not `Clone`: the nonce state must be unique.
pub struct CipherSession {
    method: CipherMethod,
    key: LessSafeKey,
    direction: Direction,
    // None until the first chunk fixes the stream nonce
    nonce: Option<[u8; NONCE_LEN]>,
}

impl CipherSession {
    /// Create a session for one direction of a connection.
    pub fn new(
        method: CipherMethod,
        key: &[u8],
        direction: Direction,
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            method,
            key: make_key(method, key)?,
            direction,
            nonce: None,
        })
    }

    /// Cipher method this session was created with
    pub fn method(&self) -> CipherMethod {
        self.method
    }

    /// Process one chunk in this session's direction.
    ///
    /// Sealing the first chunk generates the stream nonce and prepends it
    /// to the output; opening the first chunk strips and adopts it. Errors
    /// leave the session state untouched, so a failed chunk can be
    /// retransmitted and reprocessed.
    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self.direction {
            Direction::Seal => self.seal_chunk(chunk),
            Direction::Open => self.open_chunk(chunk),
        }
    }

    fn seal_chunk(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (nonce_bytes, first) = match self.nonce {
            Some(n) => (n, false),
            None => (generate_nonce(), true),
        };

        let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
        if first {
            out.extend_from_slice(&nonce_bytes);
        }

        let mut in_out = plaintext.to_vec();
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Encryption("AEAD seal failed".to_string()))?;
        out.extend_from_slice(&in_out);

        self.nonce = Some(advance_nonce(nonce_bytes));
        Ok(out)
    }

    fn open_chunk(&mut self, record: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (nonce_bytes, body, first) = match self.nonce {
            Some(n) => (n, record, false),
            None => {
                let min = NONCE_LEN + TAG_LEN;
                if record.len() < min {
                    return Err(CryptoError::MalformedInput {
                        len: record.len(),
                        min,
                    });
                }
                let mut n = [0u8; NONCE_LEN];
                n.copy_from_slice(&record[..NONCE_LEN]);
                (n, &record[NONCE_LEN..], true)
            }
        };

        if body.len() < TAG_LEN {
            return Err(CryptoError::MalformedInput {
                len: record.len(),
                min: if first { NONCE_LEN + TAG_LEN } else { TAG_LEN },
            });
        }

        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        let mut in_out = body.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::AuthenticationFailure)?
            .to_vec();

        // Advance only after a verified record
        self.nonce = Some(advance_nonce(nonce_bytes));
        Ok(plaintext)
    }
}

fn advance_nonce(mut nonce: [u8; NONCE_LEN]) -> [u8; NONCE_LEN] {
    for byte in nonce.iter_mut() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_key;

    fn pair(method: CipherMethod) -> (CipherSession, CipherSession) {
        let key = derive_key("stream-password", method.key_len());
        let seal = CipherSession::new(method, &key, Direction::Seal).unwrap();
        let open = CipherSession::new(method, &key, Direction::Open).unwrap();
        (seal, open)
    }

    #[test]
    fn test_multi_chunk_roundtrip() {
        for method in CipherMethod::supported() {
            let (mut tx, mut rx) = pair(method);
            let chunks: [&[u8]; 3] = [b"first chunk", b"second", b"third and final chunk"];
            for (i, chunk) in chunks.iter().enumerate() {
                let sealed = tx.process(chunk).unwrap();
                if i == 0 {
                    assert_eq!(sealed.len(), NONCE_LEN + chunk.len() + TAG_LEN);
                } else {
                    assert_eq!(sealed.len(), chunk.len() + TAG_LEN);
                }
                assert_eq!(rx.process(&sealed).unwrap(), *chunk);
            }
        }
    }

    #[test]
    fn test_nonce_only_on_first_record() {
        let (mut tx, _) = pair(CipherMethod::Aes256Gcm);
        let first = tx.process(b"aa").unwrap();
        let second = tx.process(b"aa").unwrap();
        assert_eq!(first.len(), NONCE_LEN + 2 + TAG_LEN);
        assert_eq!(second.len(), 2 + TAG_LEN);
    }

    #[test]
    fn test_short_first_inbound_chunk() {
        let (_, mut rx) = pair(CipherMethod::Aes256Gcm);
        let err = rx.process(&[0u8; 20]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::MalformedInput { len: 20, min: 28 }
        ));
    }

    #[test]
    fn test_short_subsequent_chunk() {
        let (mut tx, mut rx) = pair(CipherMethod::Aes256Gcm);
        let first = tx.process(b"sync").unwrap();
        rx.process(&first).unwrap();
        let err = rx.process(&[0u8; 8]).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedInput { len: 8, min: 16 }));
    }

    #[test]
    fn test_tampered_record_rejected() {
        let (mut tx, mut rx) = pair(CipherMethod::ChaCha20Poly1305);
        let first = tx.process(b"clean").unwrap();
        rx.process(&first).unwrap();
        let mut second = tx.process(b"dirty").unwrap();
        second[0] ^= 0xff;
        assert!(matches!(
            rx.process(&second),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_failed_open_does_not_advance() {
        let (mut tx, mut rx) = pair(CipherMethod::Aes256Gcm);
        let first = tx.process(b"one").unwrap();
        rx.process(&first).unwrap();

        let second = tx.process(b"two").unwrap();
        let mut mangled = second.clone();
        mangled[0] ^= 0x01;
        assert!(rx.process(&mangled).is_err());
        // Retransmission of the intact record still opens
        assert_eq!(rx.process(&second).unwrap(), b"two");
    }

    #[test]
    fn test_reordered_record_rejected() {
        let (mut tx, mut rx) = pair(CipherMethod::Aes256Gcm);
        let first = tx.process(b"one").unwrap();
        let second = tx.process(b"two").unwrap();
        let third = tx.process(b"three").unwrap();
        rx.process(&first).unwrap();
        // Skipping a record desynchronizes the nonce
        assert!(matches!(
            rx.process(&third),
            Err(CryptoError::AuthenticationFailure)
        ));
        assert_eq!(rx.process(&second).unwrap(), b"two");
    }

    #[test]
    fn test_advance_nonce_carries() {
        assert_eq!(advance_nonce([0u8; 12])[0], 1);
        let mut max_first = [0u8; 12];
        max_first[0] = 0xff;
        let next = advance_nonce(max_first);
        assert_eq!(next[0], 0);
        assert_eq!(next[1], 1);
    }

    #[test]
    fn test_independent_streams_differ() {
        let key = derive_key("stream-password", 32);
        let mut a = CipherSession::new(CipherMethod::Aes256Gcm, &key, Direction::Seal).unwrap();
        let mut b = CipherSession::new(CipherMethod::Aes256Gcm, &key, Direction::Seal).unwrap();
        // Random per-stream nonces make identical plaintext diverge
        assert_ne!(a.process(b"same").unwrap(), b.process(b"same").unwrap());
    }
}
