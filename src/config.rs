use url::Url;

use crate::fetcher::DEFAULT_TOKEN_ENDPOINT;
use crate::manager::ManagerConfig;
use crate::store::DEFAULT_COLLECTION;

pub struct Config {
    pub app_id: String,
    pub secret: String,
    /// Table (collection) holding the cached record.
    /// Set via TOKEN_CACHE_COLLECTION. Default: accessToken.
    pub collection_name: String,
    /// Keep an in-process copy of the token between calls.
    /// Set via TOKEN_CACHE_MEMOIZE. Default: true.
    pub memoize: bool,
    pub database_url: String,
    pub endpoint: Url,
    pub http_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_id", &self.app_id)
            .field("secret", &"<redacted>")
            .field("collection_name", &self.collection_name)
            .field("memoize", &self.memoize)
            .field("endpoint", &self.endpoint.as_str())
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::new(&self.app_id, &self.secret)
            .collection_name(&self.collection_name)
            .memoize(self.memoize)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup; `load` feeds it the process env.
pub fn from_lookup<F>(get: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let app_id = get("TOKEN_CACHE_APP_ID")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow::anyhow!("TOKEN_CACHE_APP_ID must be set"))?;
    let secret = get("TOKEN_CACHE_SECRET")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow::anyhow!("TOKEN_CACHE_SECRET must be set"))?;

    let memoize = match get("TOKEN_CACHE_MEMOIZE") {
        Some(raw) => parse_bool(&raw)
            .ok_or_else(|| anyhow::anyhow!("TOKEN_CACHE_MEMOIZE must be a boolean, got '{}'", raw))?,
        None => true,
    };

    let endpoint_raw = get("TOKEN_CACHE_ENDPOINT").unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.into());
    let endpoint = Url::parse(&endpoint_raw)
        .map_err(|e| anyhow::anyhow!("TOKEN_CACHE_ENDPOINT '{}' is not a valid URL: {}", endpoint_raw, e))?;

    let http_timeout_secs = match get("TOKEN_CACHE_HTTP_TIMEOUT_SECS") {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            anyhow::anyhow!("TOKEN_CACHE_HTTP_TIMEOUT_SECS must be a whole number of seconds, got '{}'", raw)
        })?,
        None => 10,
    };

    Ok(Config {
        app_id,
        secret,
        collection_name: get("TOKEN_CACHE_COLLECTION")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION.into()),
        memoize,
        database_url: get("DATABASE_URL")
            .unwrap_or_else(|| "postgres://localhost/token_cache".into()),
        endpoint,
        http_timeout_secs,
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
