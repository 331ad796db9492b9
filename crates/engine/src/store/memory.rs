//! In-memory document store.
//!
//! Backs unit and integration tests, and doubles as a reference for the
//! commit contract: verify every expected version first, then apply every
//! write, all under one lock. An `offline` toggle simulates an unreachable
//! remote so degraded-mode paths can be exercised.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{ConditionalWrite, DocumentStore, StoreError, Version, VersionedDoc};

type DocKey = (String, String);

/// Thread-safe in-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<DocKey, (Value, Version)>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the remote store becoming unreachable (or reachable again).
    /// While offline, every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_owned()));
        }
        Ok(())
    }

    fn key(collection: &str, key: &str) -> DocKey {
        (collection.to_owned(), key.to_owned())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.check_online()?;
        let docs = self.docs.read().expect("lock poisoned");
        Ok(docs.get(&Self::key(collection, key)).map(|(v, _)| v.clone()))
    }

    async fn get_versioned(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<VersionedDoc, StoreError> {
        self.check_online()?;
        let docs = self.docs.read().expect("lock poisoned");
        Ok(match docs.get(&Self::key(collection, key)) {
            Some((value, version)) => VersionedDoc {
                value: Some(value.clone()),
                version: *version,
            },
            None => VersionedDoc {
                value: None,
                version: Version::INITIAL,
            },
        })
    }

    async fn list_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        self.check_online()?;
        let docs = self.docs.read().expect("lock poisoned");
        Ok(docs
            .range(Self::key(collection, prefix)..)
            .take_while(|((coll, key), _)| coll == collection && key.starts_with(prefix))
            .map(|((_, key), (value, _))| (key.clone(), value.clone()))
            .collect())
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.check_online()?;
        let mut docs = self.docs.write().expect("lock poisoned");
        let entry = docs
            .entry(Self::key(collection, key))
            .or_insert_with(|| (Value::Null, Version::INITIAL));
        let next = entry.1.next();
        *entry = (value, next);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let mut docs = self.docs.write().expect("lock poisoned");
        docs.remove(&Self::key(collection, key));
        Ok(())
    }

    async fn commit(&self, writes: Vec<ConditionalWrite>) -> Result<(), StoreError> {
        self.check_online()?;
        let mut docs = self.docs.write().expect("lock poisoned");

        // First, verify every expected version still holds.
        for write in &writes {
            let current = docs
                .get(&Self::key(write.collection, &write.key))
                .map_or(Version::INITIAL, |(_, version)| *version);

            if current != write.expected {
                return Err(StoreError::Conflict {
                    collection: write.collection.to_owned(),
                    key: write.key.clone(),
                });
            }
        }

        // All versions match, apply every write.
        for write in writes {
            let next = write.expected.next();
            docs.insert(Self::key(write.collection, &write.key), (write.value, next));
        }

        Ok(())
    }
}
