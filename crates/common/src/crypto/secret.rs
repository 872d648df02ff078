//! Envelope body encryption
//!
//! A body is sealed exactly once under a fresh [`Secret`]. The secret never
//! travels in the clear: it is wrapped per recipient with a
//! [`SecretShare`](super::SecretShare) or under a pre-shared key with
//! [`PresharedKey`](super::PresharedKey).
//!
//! Sealed layout:
//!
//! ```text
//! [ nonce: 12 ][ chacha20poly1305( blake3(plaintext): 32 || plaintext ) ]
//! ```

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

pub const NONCE_SIZE: usize = 12;
/// ChaCha20-Poly1305 key size
pub const SECRET_SIZE: usize = 32;
const DIGEST_SIZE: usize = blake3::OUT_LEN;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("random source unavailable: {0}")]
    Random(String),
    #[error("content key must be 32 bytes, got {0}")]
    Length(usize),
    #[error("sealed body is truncated")]
    Truncated,
    #[error("aead failure")]
    Aead,
    #[error("plaintext digest mismatch")]
    Digest,
}

fn random_bytes<const N: usize>() -> Result<[u8; N], SecretError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| SecretError::Random(e.to_string()))?;
    Ok(buf)
}

/// A 256-bit content key
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Secret([u8; SECRET_SIZE]);

impl Secret {
    pub fn generate() -> Result<Self, SecretError> {
        Ok(Self(random_bytes()?))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        let key: [u8; SECRET_SIZE] = data
            .try_into()
            .map_err(|_| SecretError::Length(data.len()))?;
        Ok(Self(key))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Seal `data` under a random nonce
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let nonce: [u8; NONCE_SIZE] = random_bytes()?;

        let mut framed = Vec::with_capacity(DIGEST_SIZE + data.len());
        framed.extend_from_slice(blake3::hash(data).as_bytes());
        framed.extend_from_slice(data);

        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), framed.as_slice())
            .map_err(|_| SecretError::Aead)?;

        let mut out = nonce.to_vec();
        out.extend(sealed);
        Ok(out)
    }

    /// Open a body sealed by [`Secret::encrypt`], checking the embedded digest
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < NONCE_SIZE {
            return Err(SecretError::Truncated);
        }
        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        let mut framed = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| SecretError::Aead)?;

        if framed.len() < DIGEST_SIZE {
            return Err(SecretError::Truncated);
        }
        let plaintext = framed.split_off(DIGEST_SIZE);
        if framed.as_slice() != blake3::hash(&plaintext).as_bytes() {
            return Err(SecretError::Digest);
        }
        Ok(plaintext)
    }
}
