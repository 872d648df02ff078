//! Shared test utilities for protocol integration tests
#![allow(dead_code)]

use common::prelude::*;

pub type Ctx = Context<MemoryStore, MemoryStore>;

/// An organization with one admin, on a store shared by every principal
pub struct TestOrg {
    pub store: MemoryStore,
    pub admin: Entity,
    pub org: Ctx,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up organization "acme" administered by "alice"
pub fn setup_org() -> TestOrg {
    init_tracing();
    let store = MemoryStore::new();
    let admin = Entity::generate("alice").unwrap();
    let org = create_organization("acme", &admin, store.clone(), store.clone()).unwrap();
    TestOrg { store, admin, org }
}

/// Create a node with `csrs` CSRs in its outgoing pool
pub fn new_node(store: &MemoryStore, name: &str, csrs: usize) -> Ctx {
    let mut node = create_node(name, store.clone(), store.clone()).unwrap();
    node.replenish_csrs(csrs).unwrap();
    node
}

pub fn depth(store: &MemoryStore, owner: &uuid::Uuid, direction: Direction, channel: Channel) -> usize {
    store.size(owner, direction, channel).unwrap()
}

/// A kv store over a [`MemoryStore`] that fails writes to chosen keys
#[derive(Debug, Clone, Default)]
pub struct FailingKv {
    pub inner: MemoryStore,
    failing: std::sync::Arc<parking_lot::Mutex<Vec<(uuid::Uuid, String)>>>,
}

impl FailingKv {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Default::default(),
        }
    }

    /// Fail every `put` of `key` under `owner` until [`FailingKv::heal`]
    pub fn fail_puts(&self, owner: &uuid::Uuid, key: &str) {
        self.failing.lock().push((*owner, key.to_string()));
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }
}

impl KvStore for FailingKv {
    fn get(&self, owner: &uuid::Uuid, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(owner, key)
    }

    fn put(&self, owner: &uuid::Uuid, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self
            .failing
            .lock()
            .iter()
            .any(|(o, k)| o == owner && k == key)
        {
            return Err(StoreError::Internal("disk full".to_string()));
        }
        self.inner.put(owner, key, value)
    }

    fn delete(&self, owner: &uuid::Uuid, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(owner, key)
    }

    fn list(&self, owner: &uuid::Uuid, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(owner, prefix)
    }
}

pub type FailingCtx = Context<MemoryStore, FailingKv>;

/// An organization whose kv writes can be made to fail
pub struct FailingOrg {
    pub store: MemoryStore,
    pub kv: FailingKv,
    pub admin: Entity,
    pub org: FailingCtx,
}

pub fn setup_failing_org() -> FailingOrg {
    init_tracing();
    let store = MemoryStore::new();
    let kv = FailingKv::new(store.clone());
    let admin = Entity::generate("alice").unwrap();
    let org = create_organization("acme", &admin, store.clone(), kv.clone()).unwrap();
    FailingOrg {
        store,
        kv,
        admin,
        org,
    }
}
