//! # Trust bootstrap
//!
//! State machines that onboard principals into an organization over the
//! shared queue and kv stores:
//!
//! - [`registration`]: a node proves a pairing secret, is added to the
//!   index under the secret's tags, and receives one certificate per CA
//!   serving each of those tags
//! - [`invite`]: an admin proves an invite secret and becomes a recipient
//!   of the organization's private record
//!
//! Every operation runs against an explicit [`Context`] holding one
//! principal's entity and index. A context is single-writer: nothing here
//! locks, and two live processes for the same principal race on the index.
//!
//! Bootstrap messages that cannot be accepted are pushed back onto the
//! channel they were popped from and the failure is reported as
//! [`ProtocolError::Requeued`]. Drains are bounded by the queue depth seen
//! at entry, so a message that keeps failing costs one attempt per drain.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::entity::{read_plain, Entity, EntityError};
use crate::envelope::{decode, kinds, Envelope, EnvelopeError};
use crate::index::{IndexError, TagIndex};
use crate::pki::PkiError;
use crate::store::{Channel, Direction, KvStore, QueueStore, StoreError};

pub mod invite;
pub mod organization;
pub mod registration;

pub use invite::Invited;
pub use organization::create_organization;
pub use registration::{create_node, IssueFailure, Issuance, Issued, Registered};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("pki error: {0}")]
    Pki(#[from] PkiError),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("unknown secret: {0}")]
    UnknownSecret(String),
    #[error("missing record: {0}")]
    MissingRecord(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("queue is empty: {0}")]
    EmptyQueue(String),
    /// The message was pushed back onto its channel after `0`
    #[error("requeued after: {0}")]
    Requeued(Box<ProtocolError>),
}

/// Kv keys under a principal's id
pub mod keys {
    use uuid::Uuid;

    /// Private entity record. For an organization, encrypted to every admin.
    pub const ENTITY: &str = "entity";
    /// Self-signed public copy, for discovery
    pub const PUBLIC: &str = "public";
    pub const INDEX: &str = "index";

    pub fn ca(id: &Uuid) -> String {
        format!("ca/{}", id)
    }

    pub fn node(id: &Uuid) -> String {
        format!("node/{}", id)
    }

    pub fn admin(id: &Uuid) -> String {
        format!("admin/{}", id)
    }

    pub fn csr(id: &Uuid) -> String {
        format!("csr/{}", id)
    }

    pub fn csr_public(id: &Uuid) -> String {
        format!("csr-public/{}", id)
    }

    pub fn cert(id: &Uuid) -> String {
        format!("cert/{}", id)
    }
}

/// Outcome of draining one channel
#[derive(Debug)]
pub struct DrainReport<T> {
    /// Messages accepted, in queue order
    pub accepted: Vec<T>,
    /// Failures of messages that were pushed back
    pub requeued: Vec<ProtocolError>,
}

impl<T> Default for DrainReport<T> {
    fn default() -> Self {
        Self {
            accepted: Vec::new(),
            requeued: Vec::new(),
        }
    }
}

/// One principal's working state
#[derive(Debug)]
pub struct Context<Q, K> {
    entity: Entity,
    index: TagIndex,
    queue: Q,
    kv: K,
}

impl<Q: QueueStore, K: KvStore> Context<Q, K> {
    pub fn new(entity: Entity, index: TagIndex, queue: Q, kv: K) -> Self {
        Self {
            entity,
            index,
            queue,
            kv,
        }
    }

    /// Load `entity`'s persisted index, or start from an empty one
    pub fn load(entity: Entity, queue: Q, kv: K) -> Result<Self, ProtocolError> {
        let index = match kv.get(entity.id(), keys::INDEX)? {
            Some(bytes) => entity.open_json(&decode(&bytes)?, None)?,
            None => TagIndex::new(),
        };
        Ok(Self::new(entity, index, queue, kv))
    }

    /// Open the organization `org_id` as one of its admins
    pub fn load_organization(
        admin: &Entity,
        org_id: &Uuid,
        queue: Q,
        kv: K,
    ) -> Result<Self, ProtocolError> {
        let public = organization::public_organization(&kv, org_id)?;
        let bytes = kv
            .get(org_id, keys::ENTITY)?
            .ok_or_else(|| ProtocolError::MissingRecord(format!("organization {}", org_id)))?;
        let org: Entity = admin.open_json(&decode(&bytes)?, Some(&public))?;
        if !org.is_private() || !org.same_identity(&public) {
            return Err(ProtocolError::Rejected(format!(
                "organization record {} does not match its public copy",
                org_id
            )));
        }
        tracing::debug!("Loaded organization {} as admin {}", org_id, admin.id());
        Self::load(org, queue, kv)
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn id(&self) -> &Uuid {
        self.entity.id()
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Persist `index`, then make it current
    ///
    /// On error the in-memory index is left untouched.
    pub fn commit_index(&mut self, index: TagIndex) -> Result<(), ProtocolError> {
        let envelope = self.entity.seal_json(kinds::TAG_INDEX, &index, None)?;
        self.kv
            .put(self.entity.id(), keys::INDEX, &envelope.encode()?)?;
        self.index = index;
        Ok(())
    }

    /// Store `payload` under `key`, encrypted to `recipients` (self when
    /// `None`) and signed by this principal
    pub(crate) fn put_sealed<T: Serialize>(
        &self,
        key: &str,
        kind: &str,
        payload: &T,
        recipients: Option<&[Entity]>,
    ) -> Result<(), ProtocolError> {
        let envelope = self.entity.seal_json(kind, payload, recipients)?;
        self.kv.put(self.entity.id(), key, &envelope.encode()?)?;
        Ok(())
    }

    /// Store `payload` under `key` as a signed plaintext envelope
    pub(crate) fn put_signed<T: Serialize>(
        &self,
        key: &str,
        kind: &str,
        payload: &T,
    ) -> Result<(), ProtocolError> {
        let envelope = self.entity.sign(kind, payload)?;
        self.kv.put(self.entity.id(), key, &envelope.encode()?)?;
        Ok(())
    }

    fn get_envelope(&self, key: &str) -> Result<Envelope, ProtocolError> {
        let bytes = self
            .kv
            .get(self.entity.id(), key)?
            .ok_or_else(|| ProtocolError::MissingRecord(key.to_string()))?;
        Ok(decode(&bytes)?)
    }

    /// Read a record written with [`Context::put_sealed`]
    pub(crate) fn get_sealed<T: DeserializeOwned>(&self, key: &str) -> Result<T, ProtocolError> {
        Ok(self.entity.open_json(&self.get_envelope(key)?, None)?)
    }

    /// Read a record written with [`Context::put_signed`]
    pub(crate) fn get_signed<T: DeserializeOwned>(&self, key: &str) -> Result<T, ProtocolError> {
        Ok(self.entity.open_signed(&self.get_envelope(key)?, None)?)
    }

    pub(crate) fn delete(&self, key: &str) -> Result<bool, ProtocolError> {
        Ok(self.kv.delete(self.entity.id(), key)?)
    }

    pub(crate) fn push(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
        envelope: &Envelope,
    ) -> Result<(), ProtocolError> {
        self.queue
            .push(owner, direction, channel, &envelope.encode()?)?;
        Ok(())
    }

    /// Pop one message from this principal's incoming `channel`, run
    /// `accept` on it, and push the original bytes back if it fails
    pub(crate) fn accept_incoming<T>(
        &mut self,
        channel: Channel,
        accept: impl FnOnce(&mut Self, &[u8]) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let id = *self.entity.id();
        let bytes = self
            .queue
            .pop(&id, Direction::Incoming, channel)?
            .ok_or_else(|| ProtocolError::EmptyQueue(format!("{} {}", id, channel)))?;

        match accept(self, &bytes) {
            Ok(accepted) => Ok(accepted),
            Err(e) => {
                tracing::warn!("Requeueing {} message for {}: {}", channel, id, e);
                self.queue.push(&id, Direction::Incoming, channel, &bytes)?;
                Err(ProtocolError::Requeued(Box::new(e)))
            }
        }
    }

    /// Drain this principal's incoming `channel` with `step`, bounded by the
    /// depth at entry
    pub(crate) fn drain<T>(
        &mut self,
        channel: Channel,
        mut step: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<DrainReport<T>, ProtocolError> {
        let depth = self
            .queue
            .size(self.entity.id(), Direction::Incoming, channel)?;
        let mut report = DrainReport::default();
        for _ in 0..depth {
            match step(self) {
                Ok(accepted) => report.accepted.push(accepted),
                Err(ProtocolError::Requeued(e)) => report.requeued.push(*e),
                Err(ProtocolError::EmptyQueue(_)) => break,
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            "Drained {} for {}: {} accepted, {} requeued",
            channel,
            self.entity.id(),
            report.accepted.len(),
            report.requeued.len()
        );
        Ok(report)
    }
}

/// Parse and verify a self-signed public entity
pub(crate) fn verify_self_signed(envelope: &Envelope) -> Result<Entity, ProtocolError> {
    let entity: Entity = read_plain(envelope)?;
    if entity.private_signing_key().is_some() || entity.private_encryption_key().is_some() {
        return Err(ProtocolError::Rejected(format!(
            "public copy of {} carries private keys",
            entity.id()
        )));
    }
    if envelope.source() != entity.id() {
        return Err(ProtocolError::Rejected(format!(
            "public copy of {} was signed by {}",
            entity.id(),
            envelope.source()
        )));
    }
    entity.verify(envelope, None)?;
    Ok(entity)
}
