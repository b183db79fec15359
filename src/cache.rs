use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::CachedToken;

/// In-process memory tier: a single slot holding the last token this
/// instance wrote or read from the document store.
///
/// Cheaply cloneable; clones share the slot. Writers always replace the
/// whole value under the write lock, so readers never see a torn record.
/// The persistent store stays the source of truth.
#[derive(Clone, Default)]
pub struct MemorySlot(Arc<RwLock<Option<CachedToken>>>);

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current copy, expired or not. Expiry is the caller's call.
    pub async fn get(&self) -> Option<CachedToken> {
        self.0.read().await.clone()
    }

    /// Return the token only if it is still valid at `now_millis`.
    pub async fn get_valid(&self, now_millis: i64) -> Option<CachedToken> {
        self.0
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_valid_at(now_millis))
            .cloned()
    }

    /// Replace the slot. The stored copy never carries a store id.
    pub async fn set(&self, token: CachedToken) {
        *self.0.write().await = Some(token.detached());
    }

    pub async fn clear(&self) {
        *self.0.write().await = None;
    }
}
