//! Organization lifecycle and administration
//!
//! The organization's private record lives at `entity` under its id,
//! encrypted to itself and every admin. A self-signed public copy lives at
//! `public` so nodes and new admins can discover its keys.

use uuid::Uuid;

use super::{keys, verify_self_signed, Context, ProtocolError};
use crate::entity::Entity;
use crate::envelope::{decode, kinds};
use crate::index::{normalize_tag, ObjectKind, SharedSecret, TagIndex};
use crate::pki::{CaRecord, CertRecord};
use crate::store::{KvStore, QueueStore};

/// Create a new organization with `admin` as its first administrator
pub fn create_organization<Q: QueueStore, K: KvStore>(
    name: &str,
    admin: &Entity,
    queue: Q,
    kv: K,
) -> Result<Context<Q, K>, ProtocolError> {
    let org = Entity::generate(name)?;
    let mut ctx = Context::new(org, TagIndex::new(), queue, kv);

    let admin = admin.public();
    let mut index = TagIndex::new();
    index.insert(ObjectKind::Admin, admin.name(), *admin.id())?;

    ctx.put_signed(&keys::admin(admin.id()), kinds::PUBLIC_ENTITY, &admin)?;
    ctx.store_organization_record(std::slice::from_ref(&admin))?;
    ctx.publish()?;
    ctx.commit_index(index)?;

    tracing::info!(
        "Created organization {} ({}) with admin {}",
        name,
        ctx.id(),
        admin.name()
    );
    Ok(ctx)
}

/// Fetch and verify the public copy of organization `org_id`
pub fn public_organization<K: KvStore>(kv: &K, org_id: &Uuid) -> Result<Entity, ProtocolError> {
    let bytes = kv
        .get(org_id, keys::PUBLIC)?
        .ok_or_else(|| ProtocolError::MissingRecord(format!("public organization {}", org_id)))?;
    let org = verify_self_signed(&decode(&bytes)?)?;
    if org.id() != org_id {
        return Err(ProtocolError::Rejected(format!(
            "public copy under {} names organization {}",
            org_id,
            org.id()
        )));
    }
    Ok(org)
}

fn normalized_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| normalize_tag(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

impl<Q: QueueStore, K: KvStore> Context<Q, K> {
    /// Re-encrypt the organization's private record for itself and `admins`
    pub(crate) fn store_organization_record(&self, admins: &[Entity]) -> Result<(), ProtocolError> {
        let mut recipients = vec![self.entity.public()];
        recipients.extend(admins.iter().map(Entity::public));
        self.put_sealed(keys::ENTITY, kinds::ENTITY, &self.entity, Some(&recipients))
    }

    /// Write the self-signed public copy used for discovery
    pub(crate) fn publish(&self) -> Result<(), ProtocolError> {
        self.put_signed(keys::PUBLIC, kinds::PUBLIC_ENTITY, &self.entity.public())
    }

    /// Public entities of every admin in the index
    pub fn load_admins(&self) -> Result<Vec<Entity>, ProtocolError> {
        self.index
            .list(ObjectKind::Admin)
            .into_iter()
            .map(|(_, id)| self.get_signed(&keys::admin(&id)))
            .collect()
    }

    pub fn add_pairing_key<I, S>(&mut self, id: &str, secret: &str, tags: I) -> Result<(), ProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = self.index.clone();
        index.add_pairing_key(SharedSecret::new(id, secret, tags))?;
        self.commit_index(index)?;
        tracing::info!("Added pairing key {} to {}", id, self.id());
        Ok(())
    }

    pub fn add_invite_key(&mut self, id: &str, secret: &str) -> Result<(), ProtocolError> {
        let mut index = self.index.clone();
        index.add_invite_key(SharedSecret::new(id, secret, Vec::<String>::new()))?;
        self.commit_index(index)?;
        tracing::info!("Added invite key {} to {}", id, self.id());
        Ok(())
    }

    /// Generate a CA, store it and tag it
    pub fn create_ca<I, S>(&mut self, name: &str, tags: I) -> Result<CaRecord, ProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = self.index.clone();
        if index.contains(ObjectKind::Ca, name) {
            return Err(ProtocolError::Rejected(format!("CA {} already exists", name)));
        }
        let mut ca = CaRecord::generate(name, self.entity.name())?;
        ca.tags = normalized_tags(tags).into_iter().collect();

        index.insert(ObjectKind::Ca, name, ca.id)?;
        for tag in &ca.tags {
            index.tag(ObjectKind::Ca, &ca.id, tag)?;
        }
        self.put_sealed(&keys::ca(&ca.id), kinds::CA, &ca, None)?;
        self.commit_index(index)?;
        tracing::info!("Created CA {} ({}) tags {:?}", name, ca.id, ca.tags);
        Ok(ca)
    }

    pub fn load_ca(&self, id: &Uuid) -> Result<CaRecord, ProtocolError> {
        self.get_sealed(&keys::ca(id))
    }

    /// Add a tag to the CA `name`. Returns false if it was already tagged.
    pub fn tag_ca(&mut self, name: &str, tag: &str) -> Result<bool, ProtocolError> {
        self.retag_ca(name, tag, true)
    }

    pub fn untag_ca(&mut self, name: &str, tag: &str) -> Result<bool, ProtocolError> {
        self.retag_ca(name, tag, false)
    }

    fn retag_ca(&mut self, name: &str, tag: &str, add: bool) -> Result<bool, ProtocolError> {
        let tag = normalize_tag(tag);
        if tag.is_empty() {
            return Err(ProtocolError::Rejected("empty tag".to_string()));
        }
        let mut index = self.index.clone();
        let id = index.get(ObjectKind::Ca, name)?;
        let changed = if add {
            index.tag(ObjectKind::Ca, &id, &tag)?
        } else {
            index.untag(ObjectKind::Ca, &id, &tag)?
        };
        if !changed {
            return Ok(false);
        }

        let mut ca = self.load_ca(&id)?;
        ca.tags = index.tags_of(ObjectKind::Ca, &id);
        self.put_sealed(&keys::ca(&id), kinds::CA, &ca, None)?;
        self.commit_index(index)?;
        Ok(true)
    }

    pub fn remove_ca(&mut self, name: &str) -> Result<Uuid, ProtocolError> {
        let mut index = self.index.clone();
        let id = index.remove(ObjectKind::Ca, name)?;
        self.commit_index(index)?;
        self.delete(&keys::ca(&id))?;
        tracing::info!("Removed CA {} ({})", name, id);
        Ok(id)
    }

    /// Private record of a registered node
    pub fn load_node(&self, id: &Uuid) -> Result<Entity, ProtocolError> {
        self.get_sealed(&keys::node(id))
    }

    /// Remove a node and the certificates issued to it from the index
    pub fn remove_node(&mut self, name: &str) -> Result<Uuid, ProtocolError> {
        let mut index = self.index.clone();
        let id = index.remove(ObjectKind::Node, name)?;

        let mut issued = Vec::new();
        for (cert_name, cert_id) in index.list(ObjectKind::Cert) {
            let cert: CertRecord = self.get_sealed(&keys::cert(&cert_id))?;
            if cert.node_id == id {
                issued.push((cert_name.to_string(), cert_id));
            }
        }
        for (cert_name, _) in &issued {
            index.remove(ObjectKind::Cert, cert_name)?;
        }

        self.commit_index(index)?;
        self.delete(&keys::node(&id))?;
        for (_, cert_id) in &issued {
            self.delete(&keys::cert(cert_id))?;
        }
        tracing::info!("Removed node {} ({}) and {} certificates", name, id, issued.len());
        Ok(id)
    }

    /// Certificates this organization has issued, or a node has collected
    pub fn certificates(&self) -> Result<Vec<CertRecord>, ProtocolError> {
        self.index
            .list(ObjectKind::Cert)
            .into_iter()
            .map(|(_, id)| self.get_sealed(&keys::cert(&id)))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;

    fn setup() -> (Entity, Context<MemoryStore, MemoryStore>) {
        let store = MemoryStore::new();
        let admin = Entity::generate("alice").unwrap();
        let ctx = create_organization("acme", &admin, store.clone(), store).unwrap();
        (admin, ctx)
    }

    #[test]
    fn test_create_and_load_organization() {
        let (admin, ctx) = setup();
        assert_eq!(
            ctx.index().get(ObjectKind::Admin, "alice").unwrap(),
            *admin.id()
        );

        let loaded = Context::load_organization(
            &admin,
            ctx.id(),
            ctx.queue().clone(),
            ctx.kv().clone(),
        )
        .unwrap();
        assert_eq!(loaded.entity(), ctx.entity());
        assert_eq!(loaded.index(), ctx.index());

        let admins = loaded.load_admins().unwrap();
        assert_eq!(admins, vec![admin.public()]);
    }

    #[test]
    fn test_outsider_cannot_load_organization() {
        let (_, ctx) = setup();
        let mallory = Entity::generate("mallory").unwrap();
        let err = Context::load_organization(
            &mallory,
            ctx.id(),
            ctx.queue().clone(),
            ctx.kv().clone(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Entity(crate::entity::EntityError::NotARecipient(_))
        ));
    }

    #[test]
    fn test_public_organization_is_verified() {
        let (_, ctx) = setup();
        let public = public_organization(ctx.kv(), ctx.id()).unwrap();
        assert!(public.same_identity(ctx.entity()));
        assert!(!public.is_private());

        // a copy re-signed by someone else under the same key is rejected
        let forger = Entity::generate("acme").unwrap();
        let forged = forger.sign(kinds::PUBLIC_ENTITY, &public).unwrap();
        ctx.kv()
            .put(ctx.id(), keys::PUBLIC, &forged.encode().unwrap())
            .unwrap();
        assert!(public_organization(ctx.kv(), ctx.id()).is_err());
    }

    #[test]
    fn test_ca_lifecycle() {
        let (_, mut ctx) = setup();
        let ca = ctx.create_ca("web-ca", [" Web "]).unwrap();
        assert_eq!(ctx.index().cas_for_tag("web").into_iter().collect::<Vec<_>>(), vec![ca.id]);
        assert!(ctx.create_ca("web-ca", ["web"]).is_err());

        assert!(ctx.tag_ca("web-ca", "EDGE").unwrap());
        assert!(!ctx.tag_ca("web-ca", "edge").unwrap());
        assert_eq!(ctx.load_ca(&ca.id).unwrap().tags.len(), 2);
        assert!(ctx.untag_ca("web-ca", "web").unwrap());
        assert!(ctx.index().cas_for_tag("web").is_empty());

        ctx.remove_ca("web-ca").unwrap();
        assert!(ctx.index().cas_for_tag("edge").is_empty());
        assert!(matches!(
            ctx.load_ca(&ca.id),
            Err(ProtocolError::MissingRecord(_))
        ));
        ctx.index().check_consistency().unwrap();
    }

    #[test]
    fn test_secrets_persist_with_index() {
        let (admin, mut ctx) = setup();
        ctx.add_pairing_key("p1", "s1", ["web"]).unwrap();
        ctx.add_invite_key("i1", "k1").unwrap();
        assert!(ctx.add_pairing_key("p1", "other", ["db"]).is_err());

        let loaded = Context::load_organization(
            &admin,
            ctx.id(),
            ctx.queue().clone(),
            ctx.kv().clone(),
        )
        .unwrap();
        assert_eq!(loaded.index().pairing_key("p1").unwrap().secret, "s1");
        assert!(loaded.index().invite_key("i1").is_ok());
    }
}
