//! token-cache: two-tier cache for a shared, rate-limited access token.
//!
//! The persistent tier is a document store shared by every instance; the
//! memory tier is an optional per-process slot. See [`manager`] for the
//! refresh protocol.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod manager;
pub mod models;
pub mod store;

pub use errors::{RemoteFetchError, StoreError, TokenCacheError};
pub use manager::{ManagerConfig, TokenCacheManager};
pub use models::{CachedToken, TokenResponse};
