//! # Tag index
//!
//! The directory an organization (or a node, for its own certificates) uses
//! to route trust material: name <-> id maps per object kind, bidirectional
//! id <-> tag maps, and the pairing/invite secrets handed out for bootstrap.
//!
//! CA tags are kept apart from the tags of every other kind, so "which CAs
//! serve tag `web`" and "which nodes/certs carry tag `web`" are both single
//! lookups.
//!
//! Lookups are case-sensitive. Tags are expected to be normalized with
//! [`normalize_tag`] by the caller before insertion.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: String, key: String },
    #[error("index is inconsistent: {0}")]
    Inconsistent(String),
}

impl IndexError {
    fn not_found(kind: impl std::fmt::Display, key: impl std::fmt::Display) -> Self {
        IndexError::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    fn already_exists(kind: impl std::fmt::Display, key: impl std::fmt::Display) -> Self {
        IndexError::AlreadyExists {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }
}

/// Classes of named objects tracked by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Ca,
    Cert,
    Csr,
    Node,
    Admin,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Ca,
        ObjectKind::Cert,
        ObjectKind::Csr,
        ObjectKind::Node,
        ObjectKind::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Ca => "ca",
            ObjectKind::Cert => "cert",
            ObjectKind::Csr => "csr",
            ObjectKind::Node => "node",
            ObjectKind::Admin => "admin",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trim and lower-case a tag
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// One-to-one name <-> id map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NameMap {
    by_name: BTreeMap<String, Uuid>,
    by_id: BTreeMap<Uuid, String>,
}

impl NameMap {
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn insert(&mut self, name: &str, id: Uuid) -> bool {
        if self.by_name.contains_key(name) || self.by_id.contains_key(&id) {
            return false;
        }
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        true
    }

    fn remove(&mut self, name: &str) -> Option<Uuid> {
        let id = self.by_name.remove(name)?;
        self.by_id.remove(&id);
        Some(id)
    }

    fn is_consistent(&self) -> bool {
        self.by_name.len() == self.by_id.len()
            && self
                .by_name
                .iter()
                .all(|(name, id)| self.by_id.get(id) == Some(name))
    }
}

/// Forward (id -> tags) and reverse (tag -> ids) maps, always mutated together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TagMap {
    forward: BTreeMap<Uuid, BTreeSet<String>>,
    reverse: BTreeMap<String, BTreeSet<Uuid>>,
}

impl TagMap {
    fn add(&mut self, id: Uuid, tag: &str) -> bool {
        let added = self.forward.entry(id).or_default().insert(tag.to_string());
        self.reverse.entry(tag.to_string()).or_default().insert(id);
        added
    }

    fn remove(&mut self, id: &Uuid, tag: &str) -> bool {
        let mut removed = false;
        if let Some(tags) = self.forward.get_mut(id) {
            removed = tags.remove(tag);
            if tags.is_empty() {
                self.forward.remove(id);
            }
        }
        if let Some(ids) = self.reverse.get_mut(tag) {
            ids.remove(id);
            if ids.is_empty() {
                self.reverse.remove(tag);
            }
        }
        removed
    }

    fn purge(&mut self, id: &Uuid) {
        for tag in self.forward.remove(id).unwrap_or_default() {
            if let Some(ids) = self.reverse.get_mut(&tag) {
                ids.remove(id);
                if ids.is_empty() {
                    self.reverse.remove(&tag);
                }
            }
        }
    }

    pub fn tags(&self, id: &Uuid) -> BTreeSet<String> {
        self.forward.get(id).cloned().unwrap_or_default()
    }

    pub fn ids(&self, tag: &str) -> BTreeSet<Uuid> {
        self.reverse.get(tag).cloned().unwrap_or_default()
    }

    fn ids_tagged(&self) -> impl Iterator<Item = &Uuid> {
        self.forward.keys()
    }

    fn check(&self) -> Result<(), String> {
        for (id, tags) in &self.forward {
            if tags.is_empty() {
                return Err(format!("empty tag set for {}", id));
            }
            for tag in tags {
                if !self.reverse.get(tag).is_some_and(|ids| ids.contains(id)) {
                    return Err(format!("{} -> {} missing from reverse map", id, tag));
                }
            }
        }
        for (tag, ids) in &self.reverse {
            if ids.is_empty() {
                return Err(format!("empty id set for tag {}", tag));
            }
            for id in ids {
                if !self.forward.get(id).is_some_and(|tags| tags.contains(tag)) {
                    return Err(format!("{} -> {} missing from forward map", tag, id));
                }
            }
        }
        Ok(())
    }
}

/// A pre-shared bootstrap secret and the tags it confers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedSecret {
    pub id: String,
    pub secret: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl SharedSecret {
    /// Build a secret, normalizing its tags
    pub fn new<I, S>(id: impl Into<String>, secret: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: id.into(),
            secret: secret.into(),
            tags: tags
                .into_iter()
                .map(|t| normalize_tag(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TagIndex {
    #[serde(default)]
    cas: NameMap,
    #[serde(default)]
    certs: NameMap,
    #[serde(default)]
    csrs: NameMap,
    #[serde(default)]
    nodes: NameMap,
    #[serde(default)]
    admins: NameMap,
    #[serde(default)]
    entity_tags: TagMap,
    #[serde(default)]
    ca_tags: TagMap,
    #[serde(default)]
    pairing_keys: BTreeMap<String, SharedSecret>,
    #[serde(default)]
    invite_keys: BTreeMap<String, SharedSecret>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn names(&self, kind: ObjectKind) -> &NameMap {
        match kind {
            ObjectKind::Ca => &self.cas,
            ObjectKind::Cert => &self.certs,
            ObjectKind::Csr => &self.csrs,
            ObjectKind::Node => &self.nodes,
            ObjectKind::Admin => &self.admins,
        }
    }

    fn names_mut(&mut self, kind: ObjectKind) -> &mut NameMap {
        match kind {
            ObjectKind::Ca => &mut self.cas,
            ObjectKind::Cert => &mut self.certs,
            ObjectKind::Csr => &mut self.csrs,
            ObjectKind::Node => &mut self.nodes,
            ObjectKind::Admin => &mut self.admins,
        }
    }

    fn tag_map(&self, kind: ObjectKind) -> &TagMap {
        match kind {
            ObjectKind::Ca => &self.ca_tags,
            _ => &self.entity_tags,
        }
    }

    fn tag_map_mut(&mut self, kind: ObjectKind) -> &mut TagMap {
        match kind {
            ObjectKind::Ca => &mut self.ca_tags,
            _ => &mut self.entity_tags,
        }
    }

    /// Register `name -> id` under `kind`
    pub fn insert(&mut self, kind: ObjectKind, name: &str, id: Uuid) -> Result<(), IndexError> {
        if self.names_mut(kind).insert(name, id) {
            Ok(())
        } else {
            Err(IndexError::already_exists(kind, name))
        }
    }

    pub fn get(&self, kind: ObjectKind, name: &str) -> Result<Uuid, IndexError> {
        self.names(kind)
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| IndexError::not_found(kind, name))
    }

    pub fn contains(&self, kind: ObjectKind, name: &str) -> bool {
        self.names(kind).by_name.contains_key(name)
    }

    pub fn name_of(&self, kind: ObjectKind, id: &Uuid) -> Result<&str, IndexError> {
        self.names(kind)
            .by_id
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| IndexError::not_found(kind, id))
    }

    /// Every `(name, id)` of `kind`, ordered by name
    pub fn list(&self, kind: ObjectKind) -> Vec<(&str, Uuid)> {
        self.names(kind)
            .by_name
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
            .collect()
    }

    /// Remove a named object along with every tag it carries
    pub fn remove(&mut self, kind: ObjectKind, name: &str) -> Result<Uuid, IndexError> {
        let id = self
            .names_mut(kind)
            .remove(name)
            .ok_or_else(|| IndexError::not_found(kind, name))?;
        self.tag_map_mut(kind).purge(&id);
        Ok(id)
    }

    /// Tag a registered object. Returns false if it already carried the tag.
    pub fn tag(&mut self, kind: ObjectKind, id: &Uuid, tag: &str) -> Result<bool, IndexError> {
        self.name_of(kind, id)?;
        Ok(self.tag_map_mut(kind).add(*id, tag))
    }

    pub fn untag(&mut self, kind: ObjectKind, id: &Uuid, tag: &str) -> Result<bool, IndexError> {
        self.name_of(kind, id)?;
        Ok(self.tag_map_mut(kind).remove(id, tag))
    }

    pub fn tags_of(&self, kind: ObjectKind, id: &Uuid) -> BTreeSet<String> {
        self.tag_map(kind).tags(id)
    }

    /// Ids of `kind` carrying `tag`
    pub fn ids_for_tag(&self, kind: ObjectKind, tag: &str) -> BTreeSet<Uuid> {
        let names = self.names(kind);
        self.tag_map(kind)
            .ids(tag)
            .into_iter()
            .filter(|id| names.by_id.contains_key(id))
            .collect()
    }

    pub fn cas_for_tag(&self, tag: &str) -> BTreeSet<Uuid> {
        self.ids_for_tag(ObjectKind::Ca, tag)
    }

    pub fn add_pairing_key(&mut self, key: SharedSecret) -> Result<(), IndexError> {
        insert_secret(&mut self.pairing_keys, "pairing key", key)
    }

    pub fn pairing_key(&self, id: &str) -> Result<&SharedSecret, IndexError> {
        self.pairing_keys
            .get(id)
            .ok_or_else(|| IndexError::not_found("pairing key", id))
    }

    pub fn remove_pairing_key(&mut self, id: &str) -> Result<SharedSecret, IndexError> {
        self.pairing_keys
            .remove(id)
            .ok_or_else(|| IndexError::not_found("pairing key", id))
    }

    pub fn pairing_keys(&self) -> impl Iterator<Item = &SharedSecret> {
        self.pairing_keys.values()
    }

    pub fn add_invite_key(&mut self, key: SharedSecret) -> Result<(), IndexError> {
        insert_secret(&mut self.invite_keys, "invite key", key)
    }

    pub fn invite_key(&self, id: &str) -> Result<&SharedSecret, IndexError> {
        self.invite_keys
            .get(id)
            .ok_or_else(|| IndexError::not_found("invite key", id))
    }

    pub fn remove_invite_key(&mut self, id: &str) -> Result<SharedSecret, IndexError> {
        self.invite_keys
            .remove(id)
            .ok_or_else(|| IndexError::not_found("invite key", id))
    }

    pub fn invite_keys(&self) -> impl Iterator<Item = &SharedSecret> {
        self.invite_keys.values()
    }

    /// Check every structural invariant of the index
    pub fn check_consistency(&self) -> Result<(), IndexError> {
        for kind in ObjectKind::ALL {
            if !self.names(kind).is_consistent() {
                return Err(IndexError::Inconsistent(format!(
                    "{} name maps disagree",
                    kind
                )));
            }
        }
        self.entity_tags
            .check()
            .map_err(|e| IndexError::Inconsistent(format!("entity tags: {}", e)))?;
        self.ca_tags
            .check()
            .map_err(|e| IndexError::Inconsistent(format!("ca tags: {}", e)))?;

        for id in self.ca_tags.ids_tagged() {
            if !self.cas.by_id.contains_key(id) {
                return Err(IndexError::Inconsistent(format!("tagged ca {} has no name", id)));
            }
        }
        for id in self.entity_tags.ids_tagged() {
            let named = ObjectKind::ALL
                .iter()
                .filter(|kind| **kind != ObjectKind::Ca)
                .any(|kind| self.names(*kind).by_id.contains_key(id));
            if !named {
                return Err(IndexError::Inconsistent(format!("tagged id {} has no name", id)));
            }
        }
        Ok(())
    }
}

fn insert_secret(
    map: &mut BTreeMap<String, SharedSecret>,
    kind: &str,
    key: SharedSecret,
) -> Result<(), IndexError> {
    if map.contains_key(&key.id) {
        return Err(IndexError::already_exists(kind, &key.id));
    }
    map.insert(key.id.clone(), key);
    Ok(())
}
