use std::fmt;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};

/// Size of Ed25519 and X25519 private keys in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 and X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

fn random_bytes() -> Result<[u8; PRIVATE_KEY_SIZE], KeyError> {
    let mut bytes = [0u8; PRIVATE_KEY_SIZE];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
    Ok(bytes)
}

fn decode_hex(hex: &str, what: &str) -> Result<[u8; PUBLIC_KEY_SIZE], KeyError> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let mut buff = [0; PUBLIC_KEY_SIZE];
    hex::decode_to_slice(hex, &mut buff)
        .map_err(|_| anyhow::anyhow!("{} hex decode error", what))?;
    Ok(buff)
}

/// Keys travel inside JSON records as plain hex strings.
macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let hex = String::deserialize(deserializer)?;
                <$ty>::from_hex(&hex).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Public half of an entity's Ed25519 signing pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningPublicKey(VerifyingKey);

impl SigningPublicKey {
    /// Parse a public key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let bytes = decode_hex(hex, "signing public key")?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| anyhow::anyhow!("signing public key is not a valid point"))?;
        Ok(Self(key))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify an Ed25519 signature on a message.
    ///
    /// Uses strict verification, rejecting weak keys and malleable signatures.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }
}

/// Private half of an entity's Ed25519 signing pair
///
/// Never leaves the owning principal except inside an envelope encrypted
/// to that principal (or, during registration, to the organization).
#[derive(Debug, Clone)]
pub struct SigningSecretKey(SigningKey);

impl From<[u8; PRIVATE_KEY_SIZE]> for SigningSecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&secret))
    }
}

impl SigningSecretKey {
    /// Generate a new random signing key using the system RNG
    pub fn generate() -> Result<Self, KeyError> {
        Ok(Self::from(random_bytes()?))
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        Ok(Self::from(decode_hex(hex, "signing private key")?))
    }

    pub fn public(&self) -> SigningPublicKey {
        SigningPublicKey(self.0.verifying_key())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Produce a detached signature over `msg`
    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

/// Public half of an entity's X25519 encryption pair
///
/// Content keys are wrapped to this key, see [`SecretShare`](super::SecretShare).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptionPublicKey(X25519PublicKey);

impl From<[u8; PUBLIC_KEY_SIZE]> for EncryptionPublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(X25519PublicKey::from(bytes))
    }
}

impl EncryptionPublicKey {
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        Ok(Self::from(decode_hex(hex, "encryption public key")?))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub(crate) fn inner(&self) -> &X25519PublicKey {
        &self.0
    }
}

/// Private half of an entity's X25519 encryption pair
#[derive(Clone)]
pub struct EncryptionSecretKey(StaticSecret);

impl fmt::Debug for EncryptionSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncryptionSecretKey")
            .field(&self.public())
            .finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for EncryptionSecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(StaticSecret::from(secret))
    }
}

impl EncryptionSecretKey {
    pub fn generate() -> Result<Self, KeyError> {
        Ok(Self::from(random_bytes()?))
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        Ok(Self::from(decode_hex(hex, "encryption private key")?))
    }

    pub fn public(&self) -> EncryptionPublicKey {
        EncryptionPublicKey(X25519PublicKey::from(&self.0))
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub(crate) fn diffie_hellman(&self, other: &EncryptionPublicKey) -> SharedSecret {
        self.0.diffie_hellman(other.inner())
    }
}

hex_serde!(SigningPublicKey);
hex_serde!(SigningSecretKey);
hex_serde!(EncryptionPublicKey);
hex_serde!(EncryptionSecretKey);
