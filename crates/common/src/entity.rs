//! # Entities
//!
//! An entity is a keyed principal: the organization, an admin, a node, or a
//! certificate authority. Each one owns two independent key pairs:
//!
//! - an Ed25519 **signing** pair, used to sign envelopes
//! - an X25519 **encryption** pair, used to receive wrapped content keys
//!
//! Entities handed to other principals are public projections
//! ([`Entity::public`]), carrying no private keys.
//!
//! Cryptographic failures are terminal for the single operation that hit
//! them. Nothing here retries.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{
    EncryptionPublicKey, EncryptionSecretKey, KeyError, PresharedKey, PresharedKeyError, Secret,
    SecretError, SecretShare, SecretShareError, Signature, SigningPublicKey, SigningSecretKey,
};
use crate::envelope::{
    entity_slot, secret_slot, Blob, Body, Envelope, EnvelopeError, SignatureMode, KEY_ID_INPUT,
};

#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("unknown signer: {0}")]
    UnknownSigner(String),
    #[error("entity {0} is not a recipient")]
    NotARecipient(Uuid),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("entity {0} has no private {1} key")]
    MissingPrivateKey(Uuid, &'static str),
    #[error("plaintext payload must be a JSON object")]
    NotAnObject,
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("share error: {0}")]
    Share(#[from] SecretShareError),
    #[error("preshared key error: {0}")]
    Preshared(#[from] PresharedKeyError),
}

/// A principal's identity and keys
///
/// `id` is a time-ordered UUID (v7) assigned at generation and never
/// changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Entity {
    id: Uuid,
    name: String,
    public_signing_key: SigningPublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_signing_key: Option<SigningSecretKey>,
    public_encryption_key: EncryptionPublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_encryption_key: Option<EncryptionSecretKey>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.public_signing_key == other.public_signing_key
            && self.public_encryption_key == other.public_encryption_key
            && self.private_signing_key.as_ref().map(|k| k.to_bytes())
                == other.private_signing_key.as_ref().map(|k| k.to_bytes())
            && self.private_encryption_key.as_ref().map(|k| k.to_bytes())
                == other.private_encryption_key.as_ref().map(|k| k.to_bytes())
    }
}

impl Eq for Entity {}

impl Entity {
    /// Generate a new entity with fresh signing and encryption key pairs
    pub fn generate(name: impl Into<String>) -> Result<Self, EntityError> {
        let signing = SigningSecretKey::generate()?;
        let encryption = EncryptionSecretKey::generate()?;
        Ok(Self {
            id: Uuid::now_v7(),
            name: name.into(),
            public_signing_key: signing.public(),
            private_signing_key: Some(signing),
            public_encryption_key: encryption.public(),
            private_encryption_key: Some(encryption),
        })
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signing_key(&self) -> &SigningPublicKey {
        &self.public_signing_key
    }

    pub fn encryption_key(&self) -> &EncryptionPublicKey {
        &self.public_encryption_key
    }

    pub fn private_signing_key(&self) -> Option<&SigningSecretKey> {
        self.private_signing_key.as_ref()
    }

    pub fn private_encryption_key(&self) -> Option<&EncryptionSecretKey> {
        self.private_encryption_key.as_ref()
    }

    /// Whether both private keys are present
    pub fn is_private(&self) -> bool {
        self.private_signing_key.is_some() && self.private_encryption_key.is_some()
    }

    /// The projection of this entity that may be handed to other principals
    pub fn public(&self) -> Entity {
        Entity {
            id: self.id,
            name: self.name.clone(),
            public_signing_key: self.public_signing_key,
            private_signing_key: None,
            public_encryption_key: self.public_encryption_key,
            private_encryption_key: None,
        }
    }

    /// Whether `other` carries the same public keys under the same id
    pub fn same_identity(&self, other: &Entity) -> bool {
        self.id == other.id
            && self.public_signing_key == other.public_signing_key
            && self.public_encryption_key == other.public_encryption_key
    }

    fn signing_secret(&self) -> Result<&SigningSecretKey, EntityError> {
        self.private_signing_key
            .as_ref()
            .ok_or(EntityError::MissingPrivateKey(self.id, "signing"))
    }

    fn encryption_secret(&self) -> Result<&EncryptionSecretKey, EntityError> {
        self.private_encryption_key
            .as_ref()
            .ok_or(EntityError::MissingPrivateKey(self.id, "encryption"))
    }

    /// Sign a plaintext JSON object payload
    pub fn sign<T: Serialize>(&self, kind: &str, payload: &T) -> Result<Envelope, EntityError> {
        let body = match serde_json::to_value(payload)? {
            serde_json::Value::Object(map) => Body::Plain(map),
            _ => return Err(EntityError::NotAnObject),
        };
        self.sign_envelope(Envelope::new(kind, self.id, body))
    }

    /// Sign an already-built envelope as this entity
    ///
    /// The signature covers the final body and every option, so the envelope
    /// must not be touched afterwards.
    pub fn sign_envelope(&self, mut envelope: Envelope) -> Result<Envelope, EntityError> {
        let key = self.signing_secret()?;
        envelope.options.source = self.id;
        envelope.options.signature_mode = SignatureMode::Signed;
        envelope.options.signature = None;
        let signature = key.sign(&envelope.signing_bytes()?);
        envelope.options.signature = Some(Blob(signature.to_bytes().to_vec()));
        Ok(envelope)
    }

    /// Verify a signed envelope
    ///
    /// The signer's key is taken from `rider` when given (its id must be the
    /// envelope's source), otherwise from this entity.
    pub fn verify(&self, envelope: &Envelope, rider: Option<&Entity>) -> Result<(), EntityError> {
        if envelope.signature_mode() != SignatureMode::Signed {
            return Err(EntityError::UnknownSigner(format!(
                "envelope from {} is {}, not signed",
                envelope.source(),
                envelope.signature_mode()
            )));
        }
        let key = match rider {
            Some(signer) if signer.id != *envelope.source() => {
                return Err(EntityError::UnknownSigner(envelope.source().to_string()))
            }
            Some(signer) => &signer.public_signing_key,
            None => &self.public_signing_key,
        };
        let signature = envelope
            .options
            .signature
            .as_ref()
            .ok_or(EntityError::SignatureInvalid)?;
        let signature =
            Signature::from_slice(signature.as_bytes()).map_err(|_| EntityError::SignatureInvalid)?;
        key.verify(&envelope.signing_bytes()?, &signature)
            .map_err(|_| EntityError::SignatureInvalid)
    }

    fn seal(
        &self,
        kind: &str,
        plaintext: &[u8],
        recipients: &[Entity],
    ) -> Result<(Envelope, Secret), EntityError> {
        let content = Secret::generate()?;
        let ciphertext = content.encrypt(plaintext)?;
        let mut envelope = Envelope::new(kind, self.id, Body::Sealed(Blob(ciphertext)));
        for recipient in recipients {
            let share = SecretShare::new(&content, recipient.encryption_key())?;
            envelope
                .options
                .recipients
                .insert(entity_slot(&recipient.id), Blob(share.bytes().to_vec()));
        }
        Ok((envelope, content))
    }

    /// Encrypt `plaintext` once and wrap the content key for every recipient
    ///
    /// An empty recipient list addresses the envelope to this entity alone.
    pub fn encrypt(
        &self,
        kind: &str,
        plaintext: &[u8],
        recipients: &[Entity],
    ) -> Result<Envelope, EntityError> {
        let (envelope, _) = if recipients.is_empty() {
            self.seal(kind, plaintext, std::slice::from_ref(self))?
        } else {
            self.seal(kind, plaintext, recipients)?
        };
        Ok(envelope)
    }

    /// Decrypt an envelope using this entity's recipient slot
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, EntityError> {
        let ciphertext = sealed_body(envelope)?;
        let slot = envelope
            .options
            .recipients
            .get(&entity_slot(&self.id))
            .ok_or(EntityError::NotARecipient(self.id))?;
        let share = SecretShare::try_from(slot.as_bytes())
            .map_err(|e| EntityError::DecryptionFailed(e.to_string()))?;
        let content = share
            .recover(self.encryption_secret()?)
            .map_err(|e| EntityError::DecryptionFailed(e.to_string()))?;
        content
            .decrypt(ciphertext)
            .map_err(|e| EntityError::DecryptionFailed(e.to_string()))
    }

    /// Encrypt for `recipients` (this entity when `None`), then sign
    pub fn encrypt_then_sign(
        &self,
        kind: &str,
        plaintext: &[u8],
        recipients: Option<&[Entity]>,
    ) -> Result<Envelope, EntityError> {
        let envelope = self.encrypt(kind, plaintext, recipients.unwrap_or(&[]))?;
        self.sign_envelope(envelope)
    }

    /// Verify, and only then decrypt
    ///
    /// A verified envelope this entity cannot open fails with
    /// [`EntityError::NotARecipient`], never with a signature error.
    pub fn verify_then_decrypt(
        &self,
        envelope: &Envelope,
        rider: Option<&Entity>,
    ) -> Result<Vec<u8>, EntityError> {
        self.verify(envelope, rider)?;
        self.decrypt(envelope)
    }

    /// Encrypt for the known `recipients` (possibly none) and authenticate
    /// with a pre-shared secret instead of a signing key
    ///
    /// The content key is also wrapped under the secret, so the holder of
    /// `secret` can open the envelope without being a listed recipient.
    pub fn encrypt_then_authenticate(
        &self,
        kind: &str,
        plaintext: &[u8],
        recipients: &[Entity],
        secret_id: &str,
        secret: &str,
    ) -> Result<Envelope, EntityError> {
        let (mut envelope, content) = self.seal(kind, plaintext, recipients)?;
        let preshared = PresharedKey::new(secret);
        envelope
            .options
            .recipients
            .insert(secret_slot(secret_id), Blob(preshared.wrap(&content)?));
        envelope
            .options
            .signature_inputs
            .insert(KEY_ID_INPUT.to_string(), secret_id.to_string());
        envelope.options.signature_mode = SignatureMode::Authenticated;
        let tag = preshared.mac(&envelope.signing_bytes()?)?;
        envelope.options.signature = Some(Blob(tag.to_vec()));
        Ok(envelope)
    }

    /// Authenticate with the shared secret (constant-time), then decrypt
    ///
    /// Uses this entity's recipient slot when it has one, otherwise the slot
    /// wrapped under the secret.
    pub fn verify_authentication_then_decrypt(
        &self,
        envelope: &Envelope,
        secret: &str,
    ) -> Result<Vec<u8>, EntityError> {
        authenticate(envelope, secret)?;
        if envelope
            .options
            .recipients
            .contains_key(&entity_slot(&self.id))
        {
            return self.decrypt(envelope);
        }
        open_with_secret(envelope, secret)
    }

    /// Serialize `payload` as JSON, encrypt it for `recipients` and sign it
    pub fn seal_json<T: Serialize>(
        &self,
        kind: &str,
        payload: &T,
        recipients: Option<&[Entity]>,
    ) -> Result<Envelope, EntityError> {
        let plaintext = serde_json::to_vec(payload)?;
        self.encrypt_then_sign(kind, &plaintext, recipients)
    }

    /// Inverse of [`Entity::seal_json`]
    pub fn open_json<T: DeserializeOwned>(
        &self,
        envelope: &Envelope,
        rider: Option<&Entity>,
    ) -> Result<T, EntityError> {
        let plaintext = self.verify_then_decrypt(envelope, rider)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Verify a signed plaintext envelope and parse its body
    pub fn open_signed<T: DeserializeOwned>(
        &self,
        envelope: &Envelope,
        rider: Option<&Entity>,
    ) -> Result<T, EntityError> {
        self.verify(envelope, rider)?;
        read_plain(envelope)
    }
}

fn sealed_body(envelope: &Envelope) -> Result<&[u8], EntityError> {
    match &envelope.body {
        Body::Sealed(ciphertext) => Ok(ciphertext.as_bytes()),
        Body::Plain(_) => Err(EntityError::DecryptionFailed(
            "envelope body is not encrypted".to_string(),
        )),
    }
}

/// Parse the plaintext body of an envelope without checking its signature
pub fn read_plain<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, EntityError> {
    match &envelope.body {
        Body::Plain(map) => Ok(serde_json::from_value(serde_json::Value::Object(map.clone()))?),
        Body::Sealed(_) => Err(EntityError::NotAnObject),
    }
}

/// Check an authenticated envelope's MAC against `secret`
pub fn authenticate(envelope: &Envelope, secret: &str) -> Result<(), EntityError> {
    if envelope.signature_mode() != SignatureMode::Authenticated {
        return Err(EntityError::UnknownSigner(format!(
            "envelope from {} is {}, not authenticated",
            envelope.source(),
            envelope.signature_mode()
        )));
    }
    let tag = envelope
        .options
        .signature
        .as_ref()
        .ok_or(EntityError::AuthenticationFailed)?;
    PresharedKey::new(secret)
        .verify(&envelope.signing_bytes()?, tag.as_bytes())
        .map_err(|_| EntityError::AuthenticationFailed)
}

/// Decrypt an authenticated envelope through its pre-shared secret slot
pub fn open_with_secret(envelope: &Envelope, secret: &str) -> Result<Vec<u8>, EntityError> {
    let ciphertext = sealed_body(envelope)?;
    let key_id = envelope
        .key_id()
        .ok_or_else(|| EntityError::DecryptionFailed("envelope has no key-id".to_string()))?;
    let slot = envelope
        .options
        .recipients
        .get(&secret_slot(key_id))
        .ok_or_else(|| EntityError::DecryptionFailed(format!("no slot for secret {}", key_id)))?;
    let content = PresharedKey::new(secret)
        .unwrap(slot.as_bytes())
        .map_err(|e| EntityError::DecryptionFailed(e.to_string()))?;
    content
        .decrypt(ciphertext)
        .map_err(|e| EntityError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::envelope::{decode, kinds};
    use serde_json::json;

    fn entity(name: &str) -> Entity {
        Entity::generate(name).unwrap()
    }

    #[test]
    fn test_generate_and_project() {
        let alice = entity("alice");
        assert!(alice.is_private());
        let public = alice.public();
        assert!(!public.is_private());
        assert!(public.private_signing_key().is_none());
        assert!(alice.same_identity(&public));
        assert_ne!(alice, public);

        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("private-signing-key").is_none());
        assert!(json.get("public-encryption-key").is_some());
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let first = entity("first");
        let second = entity("second");
        assert_eq!(first.id().get_version_num(), 7);
        assert!(first.id() <= second.id());
    }

    #[test]
    fn test_sign_verify() {
        let alice = entity("alice");
        let envelope = alice.sign(kinds::PUBLIC_ENTITY, &json!({"hello": "world"})).unwrap();
        assert_eq!(envelope.signature_mode(), SignatureMode::Signed);
        assert_eq!(envelope.source(), alice.id());
        alice.verify(&envelope, None).unwrap();

        let bob = entity("bob");
        assert!(matches!(
            bob.verify(&envelope, None),
            Err(EntityError::SignatureInvalid)
        ));
        bob.verify(&envelope, Some(&alice.public())).unwrap();
        assert!(matches!(
            bob.verify(&envelope, Some(&bob.public())),
            Err(EntityError::UnknownSigner(_))
        ));
    }

    #[test]
    fn test_sign_rejects_non_object() {
        let alice = entity("alice");
        assert!(matches!(
            alice.sign(kinds::CSR, &"just a string"),
            Err(EntityError::NotAnObject)
        ));
    }

    #[test]
    fn test_tampering_breaks_signature() {
        let alice = entity("alice");
        let envelope = alice.sign(kinds::CSR, &json!({"name": "csr-1"})).unwrap();

        let mut body = envelope.clone();
        if let Body::Plain(map) = &mut body.body {
            map.insert("name".to_string(), json!("csr-2"));
        }
        assert!(matches!(
            alice.verify(&body, None),
            Err(EntityError::SignatureInvalid)
        ));

        let mut kind = envelope.clone();
        kind.kind = kinds::CERTIFICATE.to_string();
        assert!(alice.verify(&kind, None).is_err());

        let mut inputs = envelope.clone();
        inputs
            .options
            .signature_inputs
            .insert("extra".to_string(), "1".to_string());
        assert!(alice.verify(&inputs, None).is_err());

        let mut signature = envelope;
        if let Some(sig) = signature.options.signature.as_mut() {
            sig.0[0] ^= 0x01;
        }
        assert!(alice.verify(&signature, None).is_err());
    }

    #[test]
    fn test_encrypt_for_recipients() {
        let alice = entity("alice");
        let bob = entity("bob");
        let carol = entity("carol");
        let mallory = entity("mallory");

        let recipients = vec![bob.public(), carol.public()];
        let envelope = alice.encrypt(kinds::ENTITY, b"payload", &recipients).unwrap();
        assert_eq!(envelope.options.recipients.len(), 2);

        assert_eq!(bob.decrypt(&envelope).unwrap(), b"payload");
        assert_eq!(carol.decrypt(&envelope).unwrap(), b"payload");
        assert!(matches!(
            alice.decrypt(&envelope),
            Err(EntityError::NotARecipient(_))
        ));
        assert!(matches!(
            mallory.decrypt(&envelope),
            Err(EntityError::NotARecipient(id)) if id == *mallory.id()
        ));
    }

    #[test]
    fn test_encrypt_defaults_to_self() {
        let alice = entity("alice");
        let envelope = alice.encrypt(kinds::TAG_INDEX, b"{}", &[]).unwrap();
        assert_eq!(envelope.recipient_ids(), vec![*alice.id()]);
        assert_eq!(alice.decrypt(&envelope).unwrap(), b"{}");
    }

    #[test]
    fn test_public_projection_cannot_decrypt() {
        let alice = entity("alice");
        let envelope = alice.encrypt(kinds::ENTITY, b"x", &[]).unwrap();
        assert!(matches!(
            alice.public().decrypt(&envelope),
            Err(EntityError::MissingPrivateKey(_, "encryption"))
        ));
    }

    #[test]
    fn test_encrypt_then_sign_roundtrip_through_codec() {
        let org = entity("org");
        let node = entity("node");
        let envelope = org
            .encrypt_then_sign(kinds::CERTIFICATE, b"certificate", Some(&[node.public()]))
            .unwrap();
        let envelope = decode(&envelope.encode().unwrap()).unwrap();

        assert_eq!(
            node.verify_then_decrypt(&envelope, Some(&org.public())).unwrap(),
            b"certificate"
        );
        // verified but foreign: a decrypt error, not a signature error
        assert!(matches!(
            org.verify_then_decrypt(&envelope, None),
            Err(EntityError::NotARecipient(_))
        ));
        assert!(matches!(
            node.verify_then_decrypt(&envelope, None),
            Err(EntityError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_decrypt() {
        let alice = entity("alice");
        let mut envelope = alice.encrypt(kinds::ENTITY, b"secret", &[]).unwrap();
        if let Body::Sealed(blob) = &mut envelope.body {
            let last = blob.0.len() - 1;
            blob.0[last] ^= 0xFF;
        }
        assert!(matches!(
            alice.decrypt(&envelope),
            Err(EntityError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_authenticated_roundtrip() {
        let node = entity("n1");
        let org = entity("org");
        let envelope = node
            .encrypt_then_authenticate(kinds::REGISTRATION, b"node record", &[], "p1", "s1")
            .unwrap();
        assert_eq!(envelope.key_id(), Some("p1"));
        assert_eq!(envelope.signature_mode(), SignatureMode::Authenticated);

        let envelope = decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(
            org.verify_authentication_then_decrypt(&envelope, "s1")
                .unwrap(),
            b"node record"
        );
        assert!(matches!(
            org.verify_authentication_then_decrypt(&envelope, "s2"),
            Err(EntityError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_authenticated_with_known_recipient() {
        let admin = entity("bob");
        let org = entity("org");
        let envelope = admin
            .encrypt_then_authenticate(kinds::INVITE, b"admin", &[org.public()], "i1", "k1")
            .unwrap();
        assert_eq!(envelope.recipient_ids(), vec![*org.id()]);
        assert_eq!(
            org.verify_authentication_then_decrypt(&envelope, "k1")
                .unwrap(),
            b"admin"
        );
        assert_eq!(open_with_secret(&envelope, "k1").unwrap(), b"admin");
    }

    #[test]
    fn test_authenticated_tamper_detected() {
        let node = entity("n1");
        let mut envelope = node
            .encrypt_then_authenticate(kinds::REGISTRATION, b"x", &[], "p1", "s1")
            .unwrap();
        envelope
            .options
            .signature_inputs
            .insert(KEY_ID_INPUT.to_string(), "p2".to_string());
        assert!(matches!(
            authenticate(&envelope, "s1"),
            Err(EntityError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_modes_are_not_interchangeable() {
        let alice = entity("alice");
        let signed = alice.sign(kinds::CSR, &json!({})).unwrap();
        assert!(matches!(
            authenticate(&signed, "s1"),
            Err(EntityError::UnknownSigner(_))
        ));

        let authenticated = alice
            .encrypt_then_authenticate(kinds::REGISTRATION, b"x", &[], "p1", "s1")
            .unwrap();
        assert!(matches!(
            alice.verify(&authenticated, None),
            Err(EntityError::UnknownSigner(_))
        ));
    }

    #[test]
    fn test_json_helpers() {
        let org = entity("org");
        let admin = entity("admin");
        let envelope = org
            .seal_json(kinds::ENTITY, &org, Some(&[admin.public()]))
            .unwrap();
        let recovered: Entity = admin.open_json(&envelope, Some(&org.public())).unwrap();
        assert_eq!(recovered, org);

        let public = org.sign(kinds::PUBLIC_ENTITY, &org.public()).unwrap();
        let parsed: Entity = admin.open_signed(&public, Some(&org.public())).unwrap();
        assert_eq!(parsed, org.public());
    }
}
