//! Persistent tier: document-store access for cached token records.
//!
//! `DocumentStore` is the collaborator contract (create collection, find by
//! app id, insert, update by id). `TokenCacheStore` binds one backend to one
//! collection and classifies failures as read or write errors.
//!
//! Backends:
//! - `postgres::PgDocumentStore`: one table per collection, shared by every
//!   process instance.
//! - `memory::MemoryDocumentStore`: process-local, used for single-instance
//!   deployments and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::{StoreError, TokenCacheError};
use crate::models::{CachedToken, NewCachedToken};

pub const DEFAULT_COLLECTION: &str = "accessToken";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn create_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// First record whose `app_id` matches, if any.
    async fn find_one_by_app_id(
        &self,
        collection: &str,
        app_id: &str,
    ) -> Result<Option<CachedToken>, StoreError>;

    /// Persist a new record and return it with its assigned id.
    /// A second record for the same `app_id` is rejected with
    /// `StoreError::Duplicate`.
    async fn insert(
        &self,
        collection: &str,
        record: &NewCachedToken,
    ) -> Result<CachedToken, StoreError>;

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        record: &NewCachedToken,
    ) -> Result<(), StoreError>;
}

/// Persistence-tier access for one collection.
#[derive(Clone)]
pub struct TokenCacheStore {
    documents: Arc<dyn DocumentStore>,
    collection: String,
}

impl TokenCacheStore {
    pub fn new(documents: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            documents,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Idempotently provision the backing collection. Operators call this
    /// once before first use; nothing calls it implicitly.
    pub async fn ensure_collection_exists(&self) -> Result<(), TokenCacheError> {
        self.documents
            .create_collection(&self.collection)
            .await
            .map_err(TokenCacheError::StoreWrite)?;
        tracing::info!(collection = %self.collection, "token collection ready");
        Ok(())
    }

    pub async fn find_by_app_id(&self, app_id: &str) -> Result<Option<CachedToken>, TokenCacheError> {
        self.documents
            .find_one_by_app_id(&self.collection, app_id)
            .await
            .map_err(TokenCacheError::StoreRead)
    }

    pub async fn insert(&self, record: &NewCachedToken) -> Result<CachedToken, TokenCacheError> {
        self.documents
            .insert(&self.collection, record)
            .await
            .map_err(TokenCacheError::StoreWrite)
    }

    pub async fn update_by_id(&self, id: &str, record: &NewCachedToken) -> Result<(), TokenCacheError> {
        self.documents
            .update_by_id(&self.collection, id, record)
            .await
            .map_err(TokenCacheError::StoreWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryDocumentStore;
    use super::*;

    fn record(token: &str, expires_at: i64) -> NewCachedToken {
        NewCachedToken {
            app_id: "wx1".into(),
            access_token: token.into(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_insert_find_update_cycle() {
        let store = TokenCacheStore::new(Arc::new(MemoryDocumentStore::new()), DEFAULT_COLLECTION);
        store.ensure_collection_exists().await.unwrap();
        assert!(store.find_by_app_id("wx1").await.unwrap().is_none());

        let inserted = store.insert(&record("T1", 100)).await.unwrap();
        let id = inserted.id.clone().unwrap();
        assert_eq!(store.find_by_app_id("wx1").await.unwrap(), Some(inserted));

        store.update_by_id(&id, &record("T2", 200)).await.unwrap();
        let found = store.find_by_app_id("wx1").await.unwrap().unwrap();
        assert_eq!(found.id.as_deref(), Some(id.as_str()));
        assert_eq!(found.access_token, "T2");
        assert_eq!(found.expires_at, 200);
    }

    #[tokio::test]
    async fn test_failures_are_classified_by_direction() {
        // Collection never created.
        let store = TokenCacheStore::new(Arc::new(MemoryDocumentStore::new()), "missing");

        let err = store.find_by_app_id("wx1").await.unwrap_err();
        assert!(matches!(err, TokenCacheError::StoreRead(StoreError::CollectionMissing(_))));

        let err = store.insert(&record("T1", 1)).await.unwrap_err();
        assert!(matches!(err, TokenCacheError::StoreWrite(StoreError::CollectionMissing(_))));

        let err = store.update_by_id("x", &record("T1", 1)).await.unwrap_err();
        assert!(matches!(err, TokenCacheError::StoreWrite(_)));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let documents: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let a = TokenCacheStore::new(documents.clone(), "a");
        let b = TokenCacheStore::new(documents, "b");
        a.ensure_collection_exists().await.unwrap();
        b.ensure_collection_exists().await.unwrap();

        a.insert(&record("T1", 1)).await.unwrap();
        assert!(b.find_by_app_id("wx1").await.unwrap().is_none());
        assert_eq!(b.collection(), "b");
    }
}
