//! Cryptographic primitives for tagtrust
//!
//! - **Identity & Authentication**: Ed25519 signing keypairs, one per entity
//! - **Encryption**: X25519 encryption keypairs, separate from the signing pair
//! - **Content Encryption**: ChaCha20-Poly1305 under a fresh `Secret` per envelope
//! - **Key Wrapping**: the content key is wrapped once per recipient
//!   (ephemeral ECDH + AES-KW), or under a pre-shared secret during bootstrap
//!
//! # Envelope encryption
//!
//! 1. Generate a content `Secret` and encrypt the body once
//! 2. For every recipient, build a `SecretShare` against their encryption key
//! 3. Optionally wrap the secret with a `PresharedKey` for a secret holder
//!
//! A recipient recovers the content key from its own share, then decrypts.

mod keys;
mod preshared;
mod secret;
mod secret_share;

pub use ed25519_dalek::Signature;
pub use keys::{
    EncryptionPublicKey, EncryptionSecretKey, KeyError, SigningPublicKey, SigningSecretKey,
};
pub use preshared::{PresharedKey, PresharedKeyError, MAC_SIZE};
pub use secret::{Secret, SecretError};
pub use secret_share::{SecretShare, SecretShareError, SECRET_SHARE_SIZE};
