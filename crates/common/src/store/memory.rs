use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::{check_key, Channel, Direction, KvStore, QueueStore, StoreError};

/// In-memory queue and kv store
///
/// Clones share the same state, so one store can stand in for the shared
/// backend of several principals in a single process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    queues: HashMap<(Uuid, Direction, Channel), VecDeque<Vec<u8>>>,
    records: HashMap<Uuid, BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryStore {
    fn push(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
        item: &[u8],
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .queues
            .entry((*owner, direction, channel))
            .or_default()
            .push_back(item.to_vec());
        Ok(())
    }

    fn pop(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .inner
            .write()
            .queues
            .get_mut(&(*owner, direction, channel))
            .and_then(VecDeque::pop_front))
    }

    fn size(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
    ) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .read()
            .queues
            .get(&(*owner, direction, channel))
            .map(VecDeque::len)
            .unwrap_or(0))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, owner: &Uuid, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .inner
            .read()
            .records
            .get(owner)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn put(&self, owner: &Uuid, key: &str, value: &[u8]) -> Result<(), StoreError> {
        check_key(key)?;
        self.inner
            .write()
            .records
            .entry(*owner)
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, owner: &Uuid, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .write()
            .records
            .get_mut(owner)
            .and_then(|records| records.remove(key))
            .is_some())
    }

    fn list(&self, owner: &Uuid, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .records
            .get(owner)
            .map(|records| {
                records
                    .keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::test::{exercise_kv, exercise_queue};

    #[test]
    fn test_memory_queue() {
        exercise_queue(&MemoryStore::new());
    }

    #[test]
    fn test_memory_kv() {
        exercise_kv(&MemoryStore::new());
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let handle = store.clone();
        let owner = Uuid::now_v7();
        store
            .push(&owner, Direction::Incoming, Channel::Certs, b"cert")
            .unwrap();
        assert_eq!(
            handle
                .size(&owner, Direction::Incoming, Channel::Certs)
                .unwrap(),
            1
        );
    }
}
