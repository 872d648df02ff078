//! Pre-shared secret authentication for first contact
//!
//! A pairing or invite secret is handed out of band. Before either side knows
//! the other's public keys, the secret both authenticates an envelope
//! (HMAC-SHA256 over its signing bytes) and wraps the envelope's content key
//! so the organization can open it without being a listed recipient.

use aes_kw::KekAes256 as Kek;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::secret::{Secret, SecretError};

type HmacSha256 = Hmac<Sha256>;

/// Size of an HMAC-SHA256 tag in bytes
pub const MAC_SIZE: usize = 32;

const KEK_CONTEXT: &str = "tagtrust preshared secret key-wrap v1";

#[derive(Debug, thiserror::Error)]
pub enum PresharedKeyError {
    #[error("preshared key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("authentication tag mismatch")]
    Mismatch,
}

/// Key material derived from a pairing/invite secret string
#[derive(Clone)]
pub struct PresharedKey {
    mac_key: Vec<u8>,
    kek: [u8; 32],
}

impl std::fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PresharedKey(..)")
    }
}

impl PresharedKey {
    pub fn new(secret: &str) -> Self {
        Self {
            mac_key: secret.as_bytes().to_vec(),
            kek: blake3::derive_key(KEK_CONTEXT, secret.as_bytes()),
        }
    }

    fn hmac(&self) -> Result<HmacSha256, PresharedKeyError> {
        HmacSha256::new_from_slice(&self.mac_key)
            .map_err(|e| anyhow::anyhow!("invalid hmac key: {}", e).into())
    }

    /// Compute the authentication tag over `msg`
    pub fn mac(&self, msg: &[u8]) -> Result<[u8; MAC_SIZE], PresharedKeyError> {
        let mut mac = self.hmac()?;
        mac.update(msg);
        let mut tag = [0u8; MAC_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }

    /// Check `tag` against `msg` in constant time
    pub fn verify(&self, msg: &[u8], tag: &[u8]) -> Result<(), PresharedKeyError> {
        let mut mac = self.hmac()?;
        mac.update(msg);
        mac.verify_slice(tag).map_err(|_| PresharedKeyError::Mismatch)
    }

    /// Wrap a content key under the secret-derived KEK
    pub fn wrap(&self, secret: &Secret) -> Result<Vec<u8>, PresharedKeyError> {
        Kek::from(self.kek)
            .wrap_vec(secret.bytes())
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error").into())
    }

    pub fn unwrap(&self, wrapped: &[u8]) -> Result<Secret, PresharedKeyError> {
        let unwrapped = Kek::from(self.kek)
            .unwrap_vec(wrapped)
            .map_err(|_| anyhow::anyhow!("AES-KW unwrap error"))?;
        Ok(Secret::from_slice(&unwrapped)?)
    }
}
