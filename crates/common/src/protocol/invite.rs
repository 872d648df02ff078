//! Admin invites
//!
//! The invited admin sends its public entity authenticated with an invite
//! secret. Acceptance has two steps:
//!
//! 1. admission: the admin's public record is stored and the index commit
//!    adds it and consumes the invite key. A failure here requeues the
//!    request.
//! 2. welcome: the organization's private record is re-encrypted for every
//!    admin in the index and a signed public copy of the organization is
//!    delivered to the new admin's incoming `invite` channel. The answer
//!    goes to the new admin rather than the inviting one, since the new
//!    admin is the party that runs [`complete_invite`]. A failure here is
//!    reported in [`Invited::welcome_error`] and retried with
//!    [`Context::resend_invite`].
//!
//! The private record is only re-encrypted after the index lists the new
//! admin, so a failed admission never hands out the organization's keys.

use uuid::Uuid;

use super::{keys, verify_self_signed, Context, DrainReport, ProtocolError};
use crate::entity::Entity;
use crate::envelope::{decode, kinds};
use crate::index::ObjectKind;
use crate::store::{Channel, Direction, KvStore, QueueStore};

/// An admin accepted by the organization
#[derive(Debug)]
pub struct Invited {
    pub admin: Entity,
    pub invite_key: String,
    /// Set when the admin was admitted but the welcome step failed
    pub welcome_error: Option<ProtocolError>,
}

/// Ask organization `org_id` to admit `admin`
pub fn request_invite<Q: QueueStore>(
    admin: &Entity,
    org_id: &Uuid,
    invite_id: &str,
    secret: &str,
    queue: &Q,
) -> Result<(), ProtocolError> {
    let plaintext = serde_json::to_vec(&admin.public())?;
    let envelope =
        admin.encrypt_then_authenticate(kinds::INVITE, &plaintext, &[], invite_id, secret)?;
    queue.push(org_id, Direction::Incoming, Channel::Invite, &envelope.encode()?)?;
    tracing::info!(
        "Requested invite for admin {} to {} with invite key {}",
        admin.name(),
        org_id,
        invite_id
    );
    Ok(())
}

/// Take the organization's answer off `admin`'s incoming `invite` channel
/// and open the organization
pub fn complete_invite<Q: QueueStore, K: KvStore>(
    admin: &Entity,
    queue: Q,
    kv: K,
) -> Result<Context<Q, K>, ProtocolError> {
    let bytes = queue
        .pop(admin.id(), Direction::Incoming, Channel::Invite)?
        .ok_or_else(|| ProtocolError::EmptyQueue(format!("{} invite", admin.id())))?;
    let delivered = verify_self_signed(&decode(&bytes)?)?;

    let ctx = Context::load_organization(admin, delivered.id(), queue, kv)?;
    if !ctx.entity().same_identity(&delivered) {
        return Err(ProtocolError::Rejected(format!(
            "delivered organization {} does not match the stored record",
            delivered.id()
        )));
    }
    tracing::info!(
        "Admin {} joined organization {} ({})",
        admin.name(),
        ctx.entity().name(),
        ctx.id()
    );
    Ok(ctx)
}

impl<Q: QueueStore, K: KvStore> Context<Q, K> {
    /// Accept one invite from the incoming `invite` channel
    pub fn accept_invite(&mut self) -> Result<Invited, ProtocolError> {
        let (admin, invite_key) =
            self.accept_incoming(Channel::Invite, |ctx, bytes| ctx.admit_admin(bytes))?;
        tracing::info!(
            "Admitted admin {} ({}) to {}",
            admin.name(),
            admin.id(),
            self.id()
        );

        let welcome_error = match self.welcome_admin(&admin) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "Admin {} admitted to {} but not welcomed: {}",
                    admin.name(),
                    self.id(),
                    e
                );
                Some(e)
            }
        };
        Ok(Invited {
            admin,
            invite_key,
            welcome_error,
        })
    }

    /// Accept every invite queued at entry
    pub fn process_invites(&mut self) -> Result<DrainReport<Invited>, ProtocolError> {
        self.drain(Channel::Invite, |ctx| ctx.accept_invite())
    }

    /// Re-run the welcome step for an admitted admin
    pub fn resend_invite(&self, admin_name: &str) -> Result<Entity, ProtocolError> {
        let id = self.index.get(ObjectKind::Admin, admin_name)?;
        let admin: Entity = self.get_signed(&keys::admin(&id))?;
        self.welcome_admin(&admin)?;
        tracing::info!("Resent invite answer to admin {} ({})", admin_name, id);
        Ok(admin)
    }

    fn admit_admin(&mut self, bytes: &[u8]) -> Result<(Entity, String), ProtocolError> {
        let envelope = decode(bytes)?;
        let key_id = envelope
            .key_id()
            .ok_or_else(|| ProtocolError::Rejected("invite has no key-id".to_string()))?
            .to_string();
        let invite = self
            .index
            .invite_key(&key_id)
            .map_err(|_| ProtocolError::UnknownSecret(key_id.clone()))?
            .clone();

        let plaintext = self
            .entity
            .verify_authentication_then_decrypt(&envelope, &invite.secret)?;
        let admin: Entity = serde_json::from_slice(&plaintext)?;
        if admin.id() != envelope.source() {
            return Err(ProtocolError::Rejected(format!(
                "invite from {} carries entity {}",
                envelope.source(),
                admin.id()
            )));
        }
        let admin = admin.public();
        if self.index.contains(ObjectKind::Admin, admin.name()) {
            return Err(ProtocolError::Rejected(format!(
                "admin {} already exists",
                admin.name()
            )));
        }

        let mut index = self.index.clone();
        index.insert(ObjectKind::Admin, admin.name(), *admin.id())?;
        index.remove_invite_key(&key_id)?;

        // a public record left behind by a failed commit is overwritten on retry
        self.put_signed(&keys::admin(admin.id()), kinds::PUBLIC_ENTITY, &admin)?;
        self.commit_index(index)?;
        Ok((admin, key_id))
    }

    /// Re-encrypt the private record for every indexed admin, then answer
    /// `admin`
    fn welcome_admin(&self, admin: &Entity) -> Result<(), ProtocolError> {
        self.store_organization_record(&self.load_admins()?)?;
        let public = self.entity.sign(kinds::PUBLIC_ENTITY, &self.entity.public())?;
        self.push(admin.id(), Direction::Incoming, Channel::Invite, &public)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::create_organization;
    use crate::store::MemoryStore;

    #[test]
    fn test_invite_roundtrip() {
        let store = MemoryStore::new();
        let alice = Entity::generate("alice").unwrap();
        let mut org = create_organization("acme", &alice, store.clone(), store.clone()).unwrap();
        org.add_invite_key("i1", "k1").unwrap();

        let bob = Entity::generate("bob").unwrap();
        request_invite(&bob, org.id(), "i1", "k1", &store).unwrap();
        let invited = org.accept_invite().unwrap();
        assert_eq!(invited.admin, bob.public());
        assert!(invited.welcome_error.is_none());
        assert!(org.index().invite_key("i1").is_err());

        let joined = complete_invite(&bob, store.clone(), store.clone()).unwrap();
        assert_eq!(joined.entity(), org.entity());
        assert_eq!(joined.load_admins().unwrap().len(), 2);
    }

    #[test]
    fn test_wrong_invite_secret_is_requeued() {
        let store = MemoryStore::new();
        let alice = Entity::generate("alice").unwrap();
        let mut org = create_organization("acme", &alice, store.clone(), store.clone()).unwrap();
        org.add_invite_key("i1", "k1").unwrap();

        let bob = Entity::generate("bob").unwrap();
        request_invite(&bob, org.id(), "i1", "wrong", &store).unwrap();
        let err = org.accept_invite().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Requeued(ref inner)
                if matches!(**inner, ProtocolError::Entity(crate::entity::EntityError::AuthenticationFailed))
        ));
        assert_eq!(
            store
                .size(org.id(), Direction::Incoming, Channel::Invite)
                .unwrap(),
            1
        );
        assert!(!org.index().contains(ObjectKind::Admin, "bob"));
        assert!(matches!(
            complete_invite(&bob, store.clone(), store.clone()),
            Err(ProtocolError::EmptyQueue(_))
        ));
    }

    #[test]
    fn test_duplicate_admin_name_is_requeued() {
        let store = MemoryStore::new();
        let alice = Entity::generate("alice").unwrap();
        let mut org = create_organization("acme", &alice, store.clone(), store.clone()).unwrap();
        org.add_invite_key("i1", "k1").unwrap();

        let imposter = Entity::generate("alice").unwrap();
        request_invite(&imposter, org.id(), "i1", "k1", &store).unwrap();
        let report = org.process_invites().unwrap();
        assert!(report.accepted.is_empty());
        assert!(matches!(report.requeued[0], ProtocolError::Rejected(_)));
        assert!(org.index().invite_key("i1").is_ok());
    }
}
