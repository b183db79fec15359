use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::DocumentStore;
use crate::errors::StoreError;
use crate::models::{CachedToken, NewCachedToken};

/// Snapshot of operations served by a [`MemoryDocumentStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub finds: u64,
    pub inserts: u64,
    pub updates: u64,
}

#[derive(Default)]
struct Counters {
    finds: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
}

/// Process-local document store. Each collection is keyed by `app_id`, so
/// the one-record-per-app invariant holds structurally.
///
/// Only successful operations are counted.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<DashMap<String, DashMap<String, CachedToken>>>,
    counters: Arc<Counters>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            finds: self.counters.finds.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
        }
    }

    /// Number of records in a collection (for diagnostics).
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn find_one_by_app_id(
        &self,
        collection: &str,
        app_id: &str,
    ) -> Result<Option<CachedToken>, StoreError> {
        let col = self
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;
        let found = col.get(app_id).map(|entry| entry.value().clone());
        self.counters.finds.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    async fn insert(
        &self,
        collection: &str,
        record: &NewCachedToken,
    ) -> Result<CachedToken, StoreError> {
        let col = self
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;

        // entry() holds the shard lock, so check-and-insert is atomic.
        let stored = match col.entry(record.app_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::Duplicate {
                    app_id: record.app_id.clone(),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let stored = record.clone().with_id(uuid::Uuid::new_v4().to_string());
                slot.insert(stored.clone());
                stored
            }
        };
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(stored)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        record: &NewCachedToken,
    ) -> Result<(), StoreError> {
        let col = self
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;

        let current_key = col
            .iter()
            .find(|entry| entry.value().id.as_deref() == Some(id))
            .map(|entry| entry.key().clone())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        let updated = record.clone().with_id(id);
        if current_key == record.app_id {
            col.insert(current_key, updated);
        } else {
            if col.contains_key(&record.app_id) {
                return Err(StoreError::Duplicate {
                    app_id: record.app_id.clone(),
                });
            }
            col.remove(&current_key);
            col.insert(record.app_id.clone(), updated);
        }
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
