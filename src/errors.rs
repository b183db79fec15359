use thiserror::Error;

/// Failure talking to the token-issuing endpoint.
///
/// Every failure path of a fetch ends in one of these; a fetch never stays
/// pending on a bad status or content type.
#[derive(Debug, Error)]
pub enum RemoteFetchError {
    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected content type from token endpoint: {0}")]
    ContentType(String),

    #[error("token endpoint rejected credentials: errcode={errcode} errmsg={errmsg}")]
    Api { errcode: i64, errmsg: String },

    /// Always built from an error stripped of its URL; the query string
    /// carries the app secret.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),

    #[error("malformed token response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure reported by a [`crate::store::DocumentStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a record for app_id '{app_id}' already exists")]
    Duplicate { app_id: String },

    #[error("no record with id '{id}'")]
    NotFound { id: String },

    #[error("collection '{0}' does not exist")]
    CollectionMissing(String),

    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),

    #[error("invalid record id '{0}'")]
    InvalidId(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// Errors surfaced by the public operations of
/// [`crate::manager::TokenCacheManager`]. Nothing is retried or swallowed.
#[derive(Debug, Error)]
pub enum TokenCacheError {
    #[error("remote fetch failed: {0}")]
    RemoteFetch(#[from] RemoteFetchError),

    #[error("store read failed: {0}")]
    StoreRead(#[source] StoreError),

    #[error("store write failed: {0}")]
    StoreWrite(#[source] StoreError),
}

pub type Result<T, E = TokenCacheError> = std::result::Result<T, E>;
