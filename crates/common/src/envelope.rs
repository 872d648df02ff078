//! # Envelope
//!
//! The versioned, self-describing container every record and queue message
//! travels in. Wire format (JSON):
//!
//! ```text
//! {
//!   "version": 1,
//!   "type": "entity",
//!   "options": {
//!     "source": "<uuid>",
//!     "signature-mode": "none" | "signed" | "authenticated",
//!     "signature": "<base64>",                       // iff mode != none
//!     "signature-inputs": { "key-id": "p1" },        // authenticated mode
//!     "recipients": { "<uuid>" | "secret:<key-id>": "<base64 wrapped key>" }
//!   },
//!   "body": { ...plaintext json... } | "<base64 ciphertext>"
//! }
//! ```
//!
//! The codec here is pure data: it checks shape, never signatures. Maps are
//! ordered and empty optionals are omitted, so encoding is canonical and a
//! decoded envelope re-encodes to the exact same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use uuid::Uuid;

/// Version written by this implementation
pub const ENVELOPE_VERSION: u32 = 1;
/// Versions [`decode`] accepts
pub const KNOWN_VERSIONS: &[u32] = &[1];

/// `signature-inputs` entry naming the pre-shared secret of an authenticated envelope
pub const KEY_ID_INPUT: &str = "key-id";
/// Prefix of the recipient slot holding a content key wrapped under a pre-shared secret
pub const SECRET_SLOT_PREFIX: &str = "secret:";

/// Well-known values of the envelope `type` field
pub mod kinds {
    pub const ENTITY: &str = "entity";
    pub const PUBLIC_ENTITY: &str = "public-entity";
    pub const TAG_INDEX: &str = "tag-index";
    pub const CA: &str = "ca";
    pub const CSR: &str = "csr";
    pub const CERTIFICATE: &str = "certificate";
    pub const REGISTRATION: &str = "registration";
    pub const INVITE: &str = "invite";
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(e: serde_json::Error) -> Self {
        EnvelopeError::Malformed(e.to_string())
    }
}

/// How the envelope's signature must be checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// Unsigned draft
    None,
    /// Ed25519 signature by the `source` entity
    Signed,
    /// HMAC under the pre-shared secret named by `signature-inputs["key-id"]`
    Authenticated,
}

impl std::fmt::Display for SignatureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureMode::None => write!(f, "none"),
            SignatureMode::Signed => write!(f, "signed"),
            SignatureMode::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Raw bytes carried as a base64 string
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blob(#[serde_as(as = "Base64")] pub Vec<u8>);

impl Blob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Options {
    /// Id of the entity that produced the envelope
    pub source: Uuid,
    pub signature_mode: SignatureMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Blob>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signature_inputs: BTreeMap<String, String>,
    /// Recipient slot -> wrapped content key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub recipients: BTreeMap<String, Blob>,
}

/// Envelope payload: plaintext JSON object, or ciphertext
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Plain(serde_json::Map<String, serde_json::Value>),
    Sealed(Blob),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub options: Options,
    pub body: Body,
}

/// Recipient slot for an entity
pub fn entity_slot(id: &Uuid) -> String {
    id.to_string()
}

/// Recipient slot for a pre-shared secret
pub fn secret_slot(key_id: &str) -> String {
    format!("{}{}", SECRET_SLOT_PREFIX, key_id)
}

/// Parse and validate an envelope. Either the whole envelope is valid or
/// nothing is returned.
pub fn decode(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    envelope.validate()?;
    Ok(envelope)
}

/// Canonical JSON encoding of an envelope
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    Ok(serde_json::to_vec(envelope)?)
}

impl Envelope {
    /// A fresh unsigned draft
    pub fn new(kind: impl Into<String>, source: Uuid, body: Body) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            kind: kind.into(),
            options: Options {
                source,
                signature_mode: SignatureMode::None,
                signature: None,
                signature_inputs: BTreeMap::new(),
                recipients: BTreeMap::new(),
            },
            body,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        encode(self)
    }

    pub fn source(&self) -> &Uuid {
        &self.options.source
    }

    pub fn signature_mode(&self) -> SignatureMode {
        self.options.signature_mode
    }

    /// Id of the pre-shared secret an authenticated envelope was made with
    pub fn key_id(&self) -> Option<&str> {
        self.options
            .signature_inputs
            .get(KEY_ID_INPUT)
            .map(String::as_str)
    }

    /// Entity ids holding a recipient slot (secret slots excluded)
    pub fn recipient_ids(&self) -> Vec<Uuid> {
        self.options
            .recipients
            .keys()
            .filter(|slot| !slot.starts_with(SECRET_SLOT_PREFIX))
            .filter_map(|slot| Uuid::parse_str(slot).ok())
            .collect()
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.body, Body::Sealed(_))
    }

    /// Bytes covered by the signature: the canonical encoding with the
    /// signature itself removed. Everything else, body and options alike,
    /// is covered.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut unsigned = self.clone();
        unsigned.options.signature = None;
        encode(&unsigned)
    }

    fn validate(&self) -> Result<(), EnvelopeError> {
        if !KNOWN_VERSIONS.contains(&self.version) {
            return Err(EnvelopeError::Malformed(format!(
                "unknown version {}",
                self.version
            )));
        }
        if self.kind.trim().is_empty() {
            return Err(EnvelopeError::Malformed("missing type".to_string()));
        }
        match (self.options.signature_mode, &self.options.signature) {
            (SignatureMode::None, Some(_)) => {
                return Err(EnvelopeError::Malformed(
                    "signature present on an unsigned envelope".to_string(),
                ))
            }
            (SignatureMode::Signed | SignatureMode::Authenticated, None) => {
                return Err(EnvelopeError::Malformed(format!(
                    "signature-mode {} without signature",
                    self.options.signature_mode
                )))
            }
            _ => {}
        }
        if self.options.signature_mode == SignatureMode::Authenticated && self.key_id().is_none()
        {
            return Err(EnvelopeError::Malformed(
                "authenticated envelope without key-id".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn plain_body() -> Body {
        match json!({"name": "web-01", "tags": ["web", "edge"]}) {
            serde_json::Value::Object(map) => Body::Plain(map),
            _ => unreachable!(),
        }
    }

    fn signed_envelope() -> Envelope {
        let mut envelope = Envelope::new(kinds::CSR, Uuid::now_v7(), plain_body());
        envelope.options.signature_mode = SignatureMode::Signed;
        envelope.options.signature = Some(Blob(vec![7u8; 64]));
        envelope
    }

    #[test]
    fn test_encode_decode_is_byte_identical() {
        let mut envelope = Envelope::new(
            kinds::REGISTRATION,
            Uuid::now_v7(),
            Body::Sealed(Blob(vec![1, 2, 3, 4, 5])),
        );
        envelope.options.signature_mode = SignatureMode::Authenticated;
        envelope.options.signature = Some(Blob(vec![9u8; 32]));
        envelope
            .options
            .signature_inputs
            .insert(KEY_ID_INPUT.to_string(), "p1".to_string());
        envelope
            .options
            .recipients
            .insert(secret_slot("p1"), Blob(vec![3u8; 40]));
        envelope
            .options
            .recipients
            .insert(entity_slot(&Uuid::now_v7()), Blob(vec![4u8; 72]));

        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_wire_layout() {
        let envelope = signed_envelope();
        let value: serde_json::Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["type"], "csr");
        assert_eq!(value["options"]["signature-mode"], "signed");
        assert!(value["options"]["signature"].is_string());
        assert!(value["options"].get("recipients").is_none());
        assert_eq!(value["body"]["name"], "web-01");
    }

    #[test]
    fn test_signing_bytes_exclude_signature_only() {
        let envelope = signed_envelope();
        let mut resigned = envelope.clone();
        resigned.options.signature = Some(Blob(vec![8u8; 64]));
        assert_eq!(
            envelope.signing_bytes().unwrap(),
            resigned.signing_bytes().unwrap()
        );

        let mut tampered = envelope.clone();
        tampered.kind = kinds::CERTIFICATE.to_string();
        assert_ne!(
            envelope.signing_bytes().unwrap(),
            tampered.signing_bytes().unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let source = Uuid::now_v7();
        let cases = vec![
            json!({"version": 2, "type": "x", "options": {"source": source, "signature-mode": "none"}, "body": {}}),
            json!({"version": 1, "type": "", "options": {"source": source, "signature-mode": "none"}, "body": {}}),
            json!({"version": 1, "options": {"source": source, "signature-mode": "none"}, "body": {}}),
            json!({"version": 1, "type": "x", "options": {"signature-mode": "none"}, "body": {}}),
            json!({"version": 1, "type": "x", "options": {"source": source}, "body": {}}),
            json!({"version": 1, "type": "x", "options": {"source": source, "signature-mode": "none"}}),
            json!({"version": 1, "type": "x", "options": {"source": source, "signature-mode": "none"}, "body": 5}),
            json!({"version": 1, "type": "x", "options": {"source": source, "signature-mode": "signed"}, "body": {}}),
            json!({"version": 1, "type": "x", "options": {"source": source, "signature-mode": "authenticated", "signature": "AAAA"}, "body": {}}),
            json!({"version": 1, "type": "x", "options": {"source": source, "signature-mode": "none"}, "body": "not base64!"}),
        ];
        for case in cases {
            let bytes = serde_json::to_vec(&case).unwrap();
            assert!(
                matches!(decode(&bytes), Err(EnvelopeError::Malformed(_))),
                "accepted {}",
                case
            );
        }
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn test_recipient_ids_skip_secret_slots() {
        let id = Uuid::now_v7();
        let mut envelope = Envelope::new(kinds::ENTITY, id, Body::Sealed(Blob(vec![0])));
        envelope
            .options
            .recipients
            .insert(entity_slot(&id), Blob(vec![1]));
        envelope
            .options
            .recipients
            .insert(secret_slot("p1"), Blob(vec![2]));
        assert_eq!(envelope.recipient_ids(), vec![id]);
        assert!(envelope.is_sealed());
    }
}
