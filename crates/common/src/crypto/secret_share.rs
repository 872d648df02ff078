//! Per-recipient wrapping of a content key
//!
//! The sender generates a throwaway X25519 key, runs ECDH against the
//! recipient's encryption key and derives a key-encryption key with BLAKE3
//! over the shared point and both public keys. The content key is then
//! wrapped with AES-KW (RFC 3394). The recipient repeats the ECDH with its
//! private key.
//!
//! ```text
//! [ ephemeral public key: 32 ][ aes-kw(content key): 40 ]
//! ```

use aes_kw::KekAes256 as Kek;

use super::keys::{EncryptionPublicKey, EncryptionSecretKey, KeyError, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError, SECRET_SIZE};

/// AES-KW adds one 8-byte integrity block
const KW_OVERHEAD: usize = 8;
pub const SECRET_SHARE_SIZE: usize = PUBLIC_KEY_SIZE + SECRET_SIZE + KW_OVERHEAD;

const KEK_CONTEXT: &str = "tagtrust envelope recipient key-wrap v1";

#[derive(Debug, thiserror::Error)]
pub enum SecretShareError {
    #[error("share must be 72 bytes, got {got}")]
    Length { got: usize },
    #[error("key wrap failed")]
    Wrap,
    #[error("key unwrap failed")]
    Unwrap,
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// A content key wrapped for exactly one recipient
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SecretShare(pub(crate) [u8; SECRET_SHARE_SIZE]);

impl TryFrom<&[u8]> for SecretShare {
    type Error = SecretShareError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        bytes
            .try_into()
            .map(SecretShare)
            .map_err(|_| SecretShareError::Length { got: bytes.len() })
    }
}

fn kek_for(
    shared: &[u8; 32],
    ephemeral: &EncryptionPublicKey,
    recipient: &EncryptionPublicKey,
) -> Kek {
    let mut hasher = blake3::Hasher::new_derive_key(KEK_CONTEXT);
    hasher.update(shared);
    hasher.update(&ephemeral.to_bytes());
    hasher.update(&recipient.to_bytes());
    Kek::from(*hasher.finalize().as_bytes())
}

impl SecretShare {
    /// Wrap `secret` for the holder of `recipient`'s private key
    pub fn new(secret: &Secret, recipient: &EncryptionPublicKey) -> Result<Self, SecretShareError> {
        let ephemeral = EncryptionSecretKey::generate()?;
        let ephemeral_public = ephemeral.public();
        let shared = ephemeral.diffie_hellman(recipient);

        let wrapped = kek_for(shared.as_bytes(), &ephemeral_public, recipient)
            .wrap_vec(secret.bytes())
            .map_err(|_| SecretShareError::Wrap)?;

        let mut bytes = ephemeral_public.to_bytes().to_vec();
        bytes.extend(wrapped);
        Self::try_from(bytes.as_slice())
    }

    /// Recover the content key. Fails for any other recipient's key.
    pub fn recover(&self, recipient: &EncryptionSecretKey) -> Result<Secret, SecretShareError> {
        let (ephemeral, wrapped) = self.0.split_at(PUBLIC_KEY_SIZE);
        let mut ephemeral_bytes = [0u8; PUBLIC_KEY_SIZE];
        ephemeral_bytes.copy_from_slice(ephemeral);
        let ephemeral = EncryptionPublicKey::from(ephemeral_bytes);

        let shared = recipient.diffie_hellman(&ephemeral);
        let key = kek_for(shared.as_bytes(), &ephemeral, &recipient.public())
            .unwrap_vec(wrapped)
            .map_err(|_| SecretShareError::Unwrap)?;
        Ok(Secret::from_slice(&key)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}
