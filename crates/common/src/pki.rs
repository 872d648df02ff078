//! X.509 material and the certificate-signing collaborator
//!
//! The protocol only decides which CA signs which CSR and how the result is
//! wrapped. Building and parsing certificates is delegated to `rcgen` and
//! `x509-parser` behind [`CertificateAuthority`].
//!
//! Records here are what travels inside envelopes. Private key PEMs are
//! optional so the same record types serve as public projections.

use std::collections::BTreeSet;

use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, DnValue, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use x509_parser::prelude::*;

/// Validity period for CA certificates
pub const CA_VALIDITY_YEARS: i64 = 10;
/// Validity period for issued leaf certificates
pub const CERT_VALIDITY_YEARS: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PkiError {
    #[error("invalid CSR: {0}")]
    InvalidCsr(String),
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),
    #[error("{0} has no private key")]
    MissingPrivateKey(String),
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

fn compute_validity(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    (now, now + ::time::Duration::days(years * 365))
}

fn distinguished_name(common_name: &str, organization: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(organization.to_string()),
    );
    dn
}

fn generate_key_pair(what: &str) -> Result<KeyPair, PkiError> {
    KeyPair::generate().map_err(|e| {
        PkiError::KeyGenerationFailed(format!("failed to generate {} key: {}", what, e))
    })
}

/// A certificate authority owned by the organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub certificate_pem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_pem: Option<String>,
}

impl CaRecord {
    /// Generate a self-signed CA named `name`, issued under `organization`
    pub fn generate(name: &str, organization: &str) -> Result<Self, PkiError> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(name, organization);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let (not_before, not_after) = compute_validity(CA_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = generate_key_pair("CA")?;
        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            id: Uuid::now_v7(),
            name: name.to_string(),
            tags: BTreeSet::new(),
            certificate_pem: cert.pem(),
            private_key_pem: Some(key_pair.serialize_pem()),
        })
    }

    pub fn public(&self) -> Self {
        Self {
            private_key_pem: None,
            ..self.clone()
        }
    }
}

/// A certificate signing request produced by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CsrRecord {
    pub id: Uuid,
    pub name: String,
    pub node_id: Uuid,
    pub csr_pem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_pem: Option<String>,
}

impl CsrRecord {
    /// Generate a key pair and CSR whose subject names the node
    pub fn generate(node_id: Uuid, node_name: &str) -> Result<Self, PkiError> {
        let key_pair = generate_key_pair("CSR")?;
        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, DnValue::Utf8String(node_name.to_string()));

        let csr = params.serialize_request(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CSR: {}", e))
        })?;
        let csr_pem = csr.pem().map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to serialize CSR: {}", e))
        })?;

        let id = Uuid::now_v7();
        Ok(Self {
            id,
            name: format!("{}-{}", node_name, id),
            node_id,
            csr_pem,
            private_key_pem: Some(key_pair.serialize_pem()),
        })
    }

    pub fn public(&self) -> Self {
        Self {
            private_key_pem: None,
            ..self.clone()
        }
    }
}

/// A certificate issued to a node by one CA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CertRecord {
    pub id: Uuid,
    pub name: String,
    pub node_id: Uuid,
    pub ca_id: Uuid,
    pub csr_id: Uuid,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub certificate_pem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_pem: Option<String>,
}

impl CertRecord {
    pub fn public(&self) -> Self {
        Self {
            private_key_pem: None,
            ..self.clone()
        }
    }
}

/// Signs CSRs on behalf of an organization's CAs
pub trait CertificateAuthority {
    /// Sign `csr` with `ca`, returning the certificate PEM
    fn sign(&self, ca: &CaRecord, csr: &CsrRecord) -> Result<String, PkiError>;
}

/// [`CertificateAuthority`] backed by `rcgen`
///
/// The CSR's subject is kept; validity and usages are set here.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509Authority;

impl CertificateAuthority for X509Authority {
    fn sign(&self, ca: &CaRecord, csr: &CsrRecord) -> Result<String, PkiError> {
        let mut csr_params = CertificateSigningRequestParams::from_pem(&csr.csr_pem)
            .map_err(|e| PkiError::InvalidCsr(format!("failed to parse CSR: {}", e)))?;

        csr_params.params.is_ca = IsCa::NoCa;
        csr_params.params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        csr_params.params.extended_key_usages = vec![
            rcgen::ExtendedKeyUsagePurpose::ClientAuth,
            rcgen::ExtendedKeyUsagePurpose::ServerAuth,
        ];
        let (not_before, not_after) = compute_validity(CERT_VALIDITY_YEARS);
        csr_params.params.not_before = not_before;
        csr_params.params.not_after = not_after;

        let key_pem = ca
            .private_key_pem
            .as_deref()
            .ok_or_else(|| PkiError::MissingPrivateKey(format!("CA {}", ca.name)))?;
        let ca_key = KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))?;
        let issuer = Issuer::from_ca_cert_pem(&ca.certificate_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let signed = csr_params.signed_by(&issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to sign certificate: {}", e))
        })?;
        Ok(signed.pem())
    }
}

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>, PkiError> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Whether `cert_pem` carries a valid signature by the CA in `ca_pem`
pub fn issued_by(cert_pem: &str, ca_pem: &str) -> Result<bool, PkiError> {
    let cert_der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;
    let ca_der = parse_pem(ca_pem)?;
    let (_, ca_cert) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse CA cert: {}", e)))?;

    Ok(cert.verify_signature(Some(ca_cert.public_key())).is_ok())
}

/// Subject common name of a certificate
pub fn common_name(cert_pem: &str) -> Result<String, PkiError> {
    let der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;
    let name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("")
        .to_string();
    Ok(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ca_generation() {
        let ca = CaRecord::generate("web-ca", "acme").unwrap();
        assert!(ca.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(ca.private_key_pem.is_some());
        assert_eq!(common_name(&ca.certificate_pem).unwrap(), "web-ca");
        // self-signed
        assert!(issued_by(&ca.certificate_pem, &ca.certificate_pem).unwrap());
        assert!(ca.public().private_key_pem.is_none());
    }

    #[test]
    fn test_sign_csr_keeps_subject() {
        let ca = CaRecord::generate("web-ca", "acme").unwrap();
        let node = Uuid::now_v7();
        let csr = CsrRecord::generate(node, "n1").unwrap();
        assert!(csr.name.starts_with("n1-"));
        assert!(csr.csr_pem.contains("CERTIFICATE REQUEST"));

        let cert = X509Authority.sign(&ca, &csr).unwrap();
        assert_eq!(common_name(&cert).unwrap(), "n1");
        assert!(issued_by(&cert, &ca.certificate_pem).unwrap());

        let other = CaRecord::generate("db-ca", "acme").unwrap();
        assert!(!issued_by(&cert, &other.certificate_pem).unwrap());
    }

    #[test]
    fn test_sign_requires_ca_key() {
        let ca = CaRecord::generate("web-ca", "acme").unwrap();
        let csr = CsrRecord::generate(Uuid::now_v7(), "n1").unwrap();
        assert!(matches!(
            X509Authority.sign(&ca.public(), &csr),
            Err(PkiError::MissingPrivateKey(_))
        ));
    }

    #[test]
    fn test_sign_rejects_garbage_csr() {
        let ca = CaRecord::generate("web-ca", "acme").unwrap();
        let mut csr = CsrRecord::generate(Uuid::now_v7(), "n1").unwrap();
        csr.csr_pem = "not a csr".to_string();
        assert!(matches!(
            X509Authority.sign(&ca, &csr),
            Err(PkiError::InvalidCsr(_))
        ));
    }
}
