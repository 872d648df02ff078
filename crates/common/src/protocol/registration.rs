//! Node registration and certificate fan-out
//!
//! Node side:
//! 1. [`create_node`] generates the node's entity
//! 2. [`Context::register_node`] sends its private record to the
//!    organization, authenticated with a pairing secret
//! 3. [`Context::replenish_csrs`] keeps a pool of signed CSRs on the node's
//!    outgoing `csrs` channel
//! 4. [`Context::collect_certificates`] takes issued certificates off the
//!    incoming `certs` channel and merges in the archived CSR private keys
//!
//! Organization side:
//! [`Context::accept_registration`] takes one message off the incoming
//! `registration` channel. A message that fails before the index commit is
//! pushed back. After that, certificates are issued for every
//! (node tag, CA with that tag) pair and each failure is recorded in the
//! [`Issuance`] without undoing the registration.

use uuid::Uuid;

use super::{keys, Context, DrainReport, ProtocolError};
use crate::entity::Entity;
use crate::envelope::{decode, kinds};
use crate::index::{ObjectKind, TagIndex};
use crate::pki::{CertRecord, CertificateAuthority, CsrRecord};
use crate::store::{Channel, Direction, KvStore, QueueStore};

/// A certificate delivered to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub cert_id: Uuid,
    pub ca_id: Uuid,
    pub tag: String,
}

/// A (tag, CA) pair that did not produce a certificate
#[derive(Debug)]
pub struct IssueFailure {
    pub ca_id: Uuid,
    pub tag: String,
    pub error: ProtocolError,
}

#[derive(Debug, Default)]
pub struct Issuance {
    pub issued: Vec<Issued>,
    pub failed: Vec<IssueFailure>,
}

/// A node accepted by the organization
#[derive(Debug)]
pub struct Registered {
    pub node: Entity,
    pub pairing_key: String,
    pub issuance: Issuance,
}

/// Generate a new node principal
pub fn create_node<Q: QueueStore, K: KvStore>(
    name: &str,
    queue: Q,
    kv: K,
) -> Result<Context<Q, K>, ProtocolError> {
    let node = Entity::generate(name)?;
    let mut ctx = Context::new(node, TagIndex::new(), queue, kv);
    ctx.commit_index(TagIndex::new())?;
    tracing::info!("Created node {} ({})", name, ctx.id());
    Ok(ctx)
}

impl<Q: QueueStore, K: KvStore> Context<Q, K> {
    /// Send this node's private record to the organization
    pub fn register_node(
        &self,
        org_id: &Uuid,
        pairing_id: &str,
        secret: &str,
    ) -> Result<(), ProtocolError> {
        let plaintext = serde_json::to_vec(&self.entity)?;
        let envelope = self.entity.encrypt_then_authenticate(
            kinds::REGISTRATION,
            &plaintext,
            &[],
            pairing_id,
            secret,
        )?;
        self.push(org_id, Direction::Incoming, Channel::Registration, &envelope)?;
        tracing::info!(
            "Sent registration for node {} to {} with pairing key {}",
            self.entity.name(),
            org_id,
            pairing_id
        );
        Ok(())
    }

    /// Top the outgoing CSR pool up to `min`. Returns how many were generated.
    pub fn replenish_csrs(&mut self, min: usize) -> Result<usize, ProtocolError> {
        let outstanding = self
            .queue
            .size(self.entity.id(), Direction::Outgoing, Channel::Csrs)?;
        if outstanding >= min {
            return Ok(0);
        }

        let mut index = self.index.clone();
        let mut generated = 0;
        for _ in outstanding..min {
            let csr = CsrRecord::generate(*self.entity.id(), self.entity.name())?;
            self.put_sealed(&keys::csr(&csr.id), kinds::CSR, &csr, None)?;

            let public = self.entity.sign(kinds::CSR, &csr.public())?;
            self.kv
                .put(self.entity.id(), &keys::csr_public(&csr.id), &public.encode()?)?;
            index.insert(ObjectKind::Csr, &csr.name, csr.id)?;
            self.push(self.entity.id(), Direction::Outgoing, Channel::Csrs, &public)?;
            generated += 1;
        }
        self.commit_index(index)?;
        tracing::debug!(
            "Generated {} CSRs for node {} ({} outstanding before)",
            generated,
            self.entity.name(),
            outstanding
        );
        Ok(generated)
    }

    /// Drain the incoming `certs` channel
    ///
    /// Each certificate must be signed by `org` and encrypted to this node.
    /// The matching CSR's private key is merged in and the certificate is
    /// stored encrypted to this node. The CSR itself is retired.
    pub fn collect_certificates(&mut self, org: &Entity) -> Result<Vec<CertRecord>, ProtocolError> {
        let id = *self.entity.id();
        let depth = self.queue.size(&id, Direction::Incoming, Channel::Certs)?;
        let mut collected = Vec::new();
        for _ in 0..depth {
            let Some(bytes) = self.queue.pop(&id, Direction::Incoming, Channel::Certs)? else {
                break;
            };
            let mut cert: CertRecord = self.entity.open_json(&decode(&bytes)?, Some(org))?;
            if cert.node_id != id {
                return Err(ProtocolError::Rejected(format!(
                    "certificate {} was issued to {}",
                    cert.id, cert.node_id
                )));
            }
            let csr: CsrRecord = self.get_sealed(&keys::csr(&cert.csr_id))?;
            cert.private_key_pem = csr.private_key_pem.clone();

            let mut index = self.index.clone();
            index.insert(ObjectKind::Cert, &cert.name, cert.id)?;
            for tag in &cert.tags {
                index.tag(ObjectKind::Cert, &cert.id, tag)?;
            }
            if index.contains(ObjectKind::Csr, &csr.name) {
                index.remove(ObjectKind::Csr, &csr.name)?;
            }
            self.put_sealed(&keys::cert(&cert.id), kinds::CERTIFICATE, &cert, None)?;
            self.commit_index(index)?;
            self.delete(&keys::csr(&csr.id))?;
            self.delete(&keys::csr_public(&csr.id))?;

            tracing::info!(
                "Collected certificate {} for node {}",
                cert.name,
                self.entity.name()
            );
            collected.push(cert);
        }
        Ok(collected)
    }

    /// Accept one registration from the incoming `registration` channel
    pub fn accept_registration(
        &mut self,
        authority: &impl CertificateAuthority,
    ) -> Result<Registered, ProtocolError> {
        let (node, pairing_key) =
            self.accept_incoming(Channel::Registration, |ctx, bytes| ctx.admit_node(bytes))?;
        let issuance = self.fan_out(&node, authority);
        tracing::info!(
            "Registered node {} ({}): {} issued, {} failed",
            node.name(),
            node.id(),
            issuance.issued.len(),
            issuance.failed.len()
        );
        Ok(Registered {
            node: node.public(),
            pairing_key,
            issuance,
        })
    }

    /// Accept every registration queued at entry
    pub fn register_nodes(
        &mut self,
        authority: &impl CertificateAuthority,
    ) -> Result<DrainReport<Registered>, ProtocolError> {
        self.drain(Channel::Registration, |ctx| {
            ctx.accept_registration(authority)
        })
    }

    /// Re-run certificate fan-out for an already registered node
    pub fn issue_certificates(
        &mut self,
        node_name: &str,
        authority: &impl CertificateAuthority,
    ) -> Result<Issuance, ProtocolError> {
        let id = self.index.get(ObjectKind::Node, node_name)?;
        let node = self.load_node(&id)?;
        Ok(self.fan_out(&node, authority))
    }

    fn admit_node(&mut self, bytes: &[u8]) -> Result<(Entity, String), ProtocolError> {
        let envelope = decode(bytes)?;
        let key_id = envelope
            .key_id()
            .ok_or_else(|| ProtocolError::Rejected("registration has no key-id".to_string()))?
            .to_string();
        let pairing = self
            .index
            .pairing_key(&key_id)
            .map_err(|_| ProtocolError::UnknownSecret(key_id.clone()))?
            .clone();

        let plaintext = self
            .entity
            .verify_authentication_then_decrypt(&envelope, &pairing.secret)?;
        let node: Entity = serde_json::from_slice(&plaintext)?;
        if node.id() != envelope.source() || !node.is_private() {
            return Err(ProtocolError::Rejected(format!(
                "registration from {} does not carry its own private record",
                envelope.source()
            )));
        }
        if self.index.contains(ObjectKind::Node, node.name()) {
            return Err(ProtocolError::Rejected(format!(
                "node {} already registered",
                node.name()
            )));
        }

        let mut index = self.index.clone();
        index.insert(ObjectKind::Node, node.name(), *node.id())?;
        for tag in &pairing.tags {
            index.tag(ObjectKind::Node, node.id(), tag)?;
        }
        index.remove_pairing_key(&key_id)?;

        let recipients = [self.entity.public(), node.public()];
        self.put_sealed(&keys::node(node.id()), kinds::ENTITY, &node, Some(&recipients))?;
        self.commit_index(index)?;
        Ok((node, key_id))
    }

    fn fan_out(&mut self, node: &Entity, authority: &impl CertificateAuthority) -> Issuance {
        let mut issuance = Issuance::default();
        for tag in self.index.tags_of(ObjectKind::Node, node.id()) {
            for ca_id in self.index.cas_for_tag(&tag) {
                match self.issue_one(node, &ca_id, &tag, authority) {
                    Ok(cert_id) => issuance.issued.push(Issued {
                        cert_id,
                        ca_id,
                        tag: tag.clone(),
                    }),
                    Err(error) => {
                        tracing::warn!(
                            "Failed to issue {} certificate for node {} from CA {}: {}",
                            tag,
                            node.name(),
                            ca_id,
                            error
                        );
                        issuance.failed.push(IssueFailure {
                            ca_id,
                            tag: tag.clone(),
                            error,
                        });
                    }
                }
            }
        }
        issuance
    }

    /// Sign the node's oldest outstanding CSR with one CA and deliver it
    ///
    /// A CSR that fails verification is dropped. One that verified is pushed
    /// back if anything after that fails.
    fn issue_one(
        &mut self,
        node: &Entity,
        ca_id: &Uuid,
        tag: &str,
        authority: &impl CertificateAuthority,
    ) -> Result<Uuid, ProtocolError> {
        let bytes = self
            .queue
            .pop(node.id(), Direction::Outgoing, Channel::Csrs)?
            .ok_or_else(|| ProtocolError::EmptyQueue(format!("{} csrs", node.id())))?;
        let csr: CsrRecord = self.entity.open_signed(&decode(&bytes)?, Some(node))?;
        if csr.node_id != *node.id() {
            return Err(ProtocolError::Rejected(format!(
                "CSR {} names node {}",
                csr.id, csr.node_id
            )));
        }

        match self.sign_and_deliver(node, ca_id, tag, &csr, authority) {
            Ok(cert_id) => Ok(cert_id),
            Err(e) => {
                self.queue
                    .push(node.id(), Direction::Outgoing, Channel::Csrs, &bytes)?;
                Err(e)
            }
        }
    }

    fn sign_and_deliver(
        &mut self,
        node: &Entity,
        ca_id: &Uuid,
        tag: &str,
        csr: &CsrRecord,
        authority: &impl CertificateAuthority,
    ) -> Result<Uuid, ProtocolError> {
        let ca = self.load_ca(ca_id)?;
        let certificate_pem = authority.sign(&ca, csr)?;
        let cert = CertRecord {
            id: Uuid::now_v7(),
            name: format!("{}-{}", ca.name, csr.name),
            node_id: *node.id(),
            ca_id: ca.id,
            csr_id: csr.id,
            tags: [tag.to_string()].into_iter().collect(),
            certificate_pem,
            private_key_pem: None,
        };

        let mut index = self.index.clone();
        index.insert(ObjectKind::Cert, &cert.name, cert.id)?;
        index.tag(ObjectKind::Cert, &cert.id, tag)?;
        self.put_sealed(&keys::cert(&cert.id), kinds::CERTIFICATE, &cert, None)?;
        self.commit_index(index)?;

        let envelope =
            self.entity
                .seal_json(kinds::CERTIFICATE, &cert, Some(&[node.public()]))?;
        self.push(node.id(), Direction::Incoming, Channel::Certs, &envelope)?;
        tracing::debug!(
            "Issued certificate {} to node {} from CA {}",
            cert.name,
            node.name(),
            ca.name
        );
        Ok(cert.id)
    }
}
