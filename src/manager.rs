//! Refresh protocol over the two cache tiers.
//!
//! Each `get_access_token` call re-evaluates from scratch:
//! memory slot (if memoizing) → document store → remote fetch, then writes
//! the fresh record back to the store and the memory slot.
//!
//! Calls are not coordinated. Two instances that both see an expired or
//! missing record will both fetch and both write; the store's one-record-
//! per-app constraint turns a racing insert into `StoreError::Duplicate`,
//! which is resolved by re-reading and overwriting (last writer wins).

use std::fmt;
use std::sync::Arc;

use crate::cache::MemorySlot;
use crate::clock::{Clock, SystemClock};
use crate::errors::{Result, TokenCacheError};
use crate::fetcher::TokenFetcher;
use crate::models::{CachedToken, NewCachedToken, TokenResponse};
use crate::store::{DocumentStore, TokenCacheStore, DEFAULT_COLLECTION};

/// Per-application settings for a [`TokenCacheManager`].
#[derive(Clone)]
pub struct ManagerConfig {
    pub app_id: String,
    pub secret: String,
    pub collection_name: String,
    pub memoize: bool,
}

impl ManagerConfig {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
            collection_name: DEFAULT_COLLECTION.to_string(),
            memoize: true,
        }
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("app_id", &self.app_id)
            .field("secret", &"<redacted>")
            .field("collection_name", &self.collection_name)
            .field("memoize", &self.memoize)
            .finish()
    }
}

pub struct TokenCacheManager {
    app_id: String,
    secret: String,
    memoize: bool,
    store: TokenCacheStore,
    fetcher: Arc<dyn TokenFetcher>,
    memory: MemorySlot,
    clock: Arc<dyn Clock>,
}

impl TokenCacheManager {
    pub fn new(
        config: ManagerConfig,
        documents: Arc<dyn DocumentStore>,
        fetcher: Arc<dyn TokenFetcher>,
    ) -> Self {
        Self {
            store: TokenCacheStore::new(documents, config.collection_name),
            app_id: config.app_id,
            secret: config.secret,
            memoize: config.memoize,
            fetcher,
            memory: MemorySlot::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a memory slot with other handles (e.g. managers for the same
    /// app in one process).
    pub fn with_memory_slot(mut self, memory: MemorySlot) -> Self {
        self.memory = memory;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn store(&self) -> &TokenCacheStore {
        &self.store
    }

    /// Return a valid access token, refreshing through the tiers as needed.
    ///
    /// Errors from the store or the fetcher are returned as-is; no stale
    /// token is ever substituted.
    pub async fn get_access_token(&self) -> Result<String> {
        if !self.memoize {
            return Ok(self.from_store_or_remote().await?.access_token);
        }

        if let Some(hit) = self.memory.get_valid(self.clock.now_millis()).await {
            tracing::debug!(app_id = %self.app_id, "access token served from memory");
            return Ok(hit.access_token);
        }

        let token = self.from_store_or_remote().await?;
        self.memory.set(token.clone()).await;
        Ok(token.access_token)
    }

    /// Fetch straight from the issuer, bypassing both tiers. Neither the
    /// store nor the memory slot is touched; callers that want the result
    /// cached must write it themselves.
    pub async fn force_get_access_token_by_http(&self) -> Result<TokenResponse> {
        Ok(self.fetcher.fetch(&self.app_id, &self.secret).await?)
    }

    /// Provision the backing collection. Must be run before first use.
    pub async fn create_collection(&self) -> Result<()> {
        self.store.ensure_collection_exists().await
    }

    /// Drop the memory copy so the next call consults the store.
    pub async fn invalidate_memory(&self) {
        self.memory.clear().await;
    }

    /// Current memory copy, if any, without checking expiry.
    pub async fn memoized(&self) -> Option<CachedToken> {
        self.memory.get().await
    }

    /// Persistent tier first, remote fetch on miss or expiry.
    async fn from_store_or_remote(&self) -> Result<CachedToken> {
        let found = self.store.find_by_app_id(&self.app_id).await?;
        let now = self.clock.now_millis();

        match found {
            Some(hit) if hit.is_valid_at(now) => {
                tracing::debug!(
                    app_id = %self.app_id,
                    collection = %self.store.collection(),
                    "access token served from store"
                );
                Ok(hit)
            }
            Some(stale) => {
                tracing::debug!(
                    app_id = %self.app_id,
                    collection = %self.store.collection(),
                    expired_at = stale.expires_at,
                    "stored access token expired, refreshing"
                );
                let record = self.fetch_record(now).await?;
                match stale.id.as_deref() {
                    Some(id) => self.store.update_by_id(id, &record).await?,
                    // Backends always return ids; treat an id-less row as absent.
                    None => return self.insert_or_overwrite(record).await,
                }
                tracing::debug!(
                    app_id = %self.app_id,
                    collection = %self.store.collection(),
                    expires_at = record.expires_at,
                    "access token refreshed"
                );
                Ok(record.into_detached())
            }
            None => {
                tracing::debug!(
                    app_id = %self.app_id,
                    collection = %self.store.collection(),
                    "no stored access token, fetching"
                );
                let record = self.fetch_record(now).await?;
                self.insert_or_overwrite(record).await
            }
        }
    }

    async fn fetch_record(&self, now: i64) -> Result<NewCachedToken> {
        let response = self.fetcher.fetch(&self.app_id, &self.secret).await?;
        Ok(response.into_record(&self.app_id, now))
    }

    /// Insert a freshly fetched record. If another instance inserted first,
    /// overwrite its row with ours.
    async fn insert_or_overwrite(&self, record: NewCachedToken) -> Result<CachedToken> {
        match self.store.insert(&record).await {
            Ok(inserted) => {
                tracing::debug!(
                    app_id = %self.app_id,
                    collection = %self.store.collection(),
                    expires_at = inserted.expires_at,
                    "access token stored"
                );
                Ok(inserted)
            }
            Err(TokenCacheError::StoreWrite(err)) if err.is_duplicate() => {
                tracing::warn!(
                    app_id = %self.app_id,
                    collection = %self.store.collection(),
                    "concurrent insert detected, overwriting existing record"
                );
                let existing = self.store.find_by_app_id(&self.app_id).await?;
                let Some(id) = existing.and_then(|e| e.id) else {
                    return Err(TokenCacheError::StoreWrite(err));
                };
                self.store.update_by_id(&id, &record).await?;
                Ok(record.with_id(id))
            }
            Err(e) => Err(e),
        }
    }
}
