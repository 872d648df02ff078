//! Storage collaborators
//!
//! Principals never talk to each other directly. Everything moves through two
//! stores shared between them:
//!
//! - a [`QueueStore`]: FIFO queues keyed by `(owner, direction, channel)`
//! - a [`KvStore`]: durable blobs keyed by `(owner, key)`
//!
//! Both are blocking. A failing store fails the calling operation right away.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("store error: {0}")]
    Internal(String),
}

/// Which side of a principal a queue sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Messages destined for the owner
    Incoming,
    /// Messages the owner produced for pickup
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Registration,
    Invite,
    Csrs,
    Certs,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Registration => "registration",
            Channel::Invite => "invite",
            Channel::Csrs => "csrs",
            Channel::Certs => "certs",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait QueueStore: Debug + Send + Sync {
    /// Append `item` to the tail of the queue
    fn push(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
        item: &[u8],
    ) -> Result<(), StoreError>;

    /// Remove and return the head of the queue, `None` when it is empty
    fn pop(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    fn size(&self, owner: &Uuid, direction: Direction, channel: Channel)
        -> Result<usize, StoreError>;
}

pub trait KvStore: Debug + Send + Sync {
    fn get(&self, owner: &Uuid, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, owner: &Uuid, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Returns whether a value was removed
    fn delete(&self, owner: &Uuid, key: &str) -> Result<bool, StoreError>;

    /// Keys of `owner` starting with `prefix`, sorted
    fn list(&self, owner: &Uuid, prefix: &str) -> Result<Vec<String>, StoreError>;
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.chars().any(char::is_control) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Behaviour every queue implementation must share
    pub fn exercise_queue(store: &impl QueueStore) {
        let owner = Uuid::now_v7();
        let other = Uuid::now_v7();
        let (incoming, outgoing) = (Direction::Incoming, Direction::Outgoing);

        assert_eq!(store.size(&owner, incoming, Channel::Csrs).unwrap(), 0);
        assert_eq!(store.pop(&owner, incoming, Channel::Csrs).unwrap(), None);

        store.push(&owner, outgoing, Channel::Csrs, b"one").unwrap();
        store.push(&owner, outgoing, Channel::Csrs, b"two").unwrap();
        store.push(&owner, outgoing, Channel::Certs, b"cert").unwrap();
        store.push(&other, outgoing, Channel::Csrs, b"other").unwrap();

        assert_eq!(store.size(&owner, outgoing, Channel::Csrs).unwrap(), 2);
        assert_eq!(store.size(&owner, incoming, Channel::Csrs).unwrap(), 0);

        assert_eq!(
            store.pop(&owner, outgoing, Channel::Csrs).unwrap(),
            Some(b"one".to_vec())
        );
        // requeue lands at the tail
        store.push(&owner, outgoing, Channel::Csrs, b"one").unwrap();
        assert_eq!(
            store.pop(&owner, outgoing, Channel::Csrs).unwrap(),
            Some(b"two".to_vec())
        );
        assert_eq!(
            store.pop(&owner, outgoing, Channel::Csrs).unwrap(),
            Some(b"one".to_vec())
        );
        assert_eq!(store.pop(&owner, outgoing, Channel::Csrs).unwrap(), None);
        assert_eq!(store.size(&other, outgoing, Channel::Csrs).unwrap(), 1);
        assert_eq!(store.size(&owner, outgoing, Channel::Certs).unwrap(), 1);
    }

    /// Behaviour every kv implementation must share
    pub fn exercise_kv(store: &impl KvStore) {
        let owner = Uuid::now_v7();
        let other = Uuid::now_v7();

        assert_eq!(store.get(&owner, "entity").unwrap(), None);
        store.put(&owner, "entity", b"v1").unwrap();
        store.put(&owner, "entity", b"v2").unwrap();
        store.put(&owner, "csr/a", b"a").unwrap();
        store.put(&owner, "csr/b", b"b").unwrap();
        store.put(&owner, "cert/a", b"c").unwrap();
        store.put(&other, "csr/z", b"z").unwrap();

        assert_eq!(store.get(&owner, "entity").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(
            store.list(&owner, "csr/").unwrap(),
            vec!["csr/a".to_string(), "csr/b".to_string()]
        );
        assert_eq!(store.list(&owner, "").unwrap().len(), 4);

        assert!(store.delete(&owner, "csr/a").unwrap());
        assert!(!store.delete(&owner, "csr/a").unwrap());
        assert_eq!(store.list(&owner, "csr/").unwrap(), vec!["csr/b".to_string()]);
        assert_eq!(store.get(&other, "csr/z").unwrap(), Some(b"z".to_vec()));

        assert!(matches!(
            store.put(&owner, "", b"x"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
