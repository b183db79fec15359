//! Remote fetch of fresh access tokens from the issuing endpoint.
//!
//! The endpoint is a plain HTTP GET:
//! `?grant_type=client_credential&appid=<app_id>&secret=<secret>`, answering
//! `{"access_token": "...", "expires_in": 7200}`. Some issuers report failures
//! with HTTP 200 and an `{"errcode", "errmsg"}` body; those are errors too.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::errors::RemoteFetchError;
use crate::models::TokenResponse;

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.weixin.qq.com/cgi-bin/token";

/// Source of fresh tokens. One call, one definite outcome.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self, app_id: &str, secret: &str) -> Result<TokenResponse, RemoteFetchError>;
}

/// `reqwest`-backed fetcher. No retries; the caller decides what to do
/// with a failure.
pub struct HttpTokenFetcher {
    endpoint: Url,
    http: Client,
}

impl HttpTokenFetcher {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, RemoteFetchError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RemoteFetchError::Transport(e.without_url()))?;
        Ok(Self::with_client(endpoint, http))
    }

    pub fn with_client(endpoint: Url, http: Client) -> Self {
        Self { endpoint, http }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self, app_id: &str, secret: &str) -> Result<TokenResponse, RemoteFetchError> {
        let resp = self
            .http
            .get(self.endpoint.clone())
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", app_id),
                ("secret", secret),
            ])
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                tracing::warn!(app_id, "token request failed: {}", e);
                RemoteFetchError::Transport(e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(app_id, status = status.as_u16(), "token endpoint returned an error status");
            return Err(RemoteFetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_json(&content_type) {
            tracing::warn!(app_id, content_type = %content_type, "token endpoint returned non-JSON content");
            return Err(RemoteFetchError::ContentType(content_type));
        }

        let body = resp.bytes().await.map_err(|e| {
            let e = e.without_url();
            tracing::warn!(app_id, "reading token response failed: {}", e);
            RemoteFetchError::Transport(e)
        })?;
        let value: Value = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(app_id, "token response is not valid JSON: {}", e);
            RemoteFetchError::Decode(e)
        })?;

        if let Some(errcode) = value.get("errcode").and_then(Value::as_i64) {
            if errcode != 0 {
                let errmsg = value
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                tracing::warn!(app_id, errcode, errmsg = %errmsg, "token endpoint rejected the request");
                return Err(RemoteFetchError::Api { errcode, errmsg });
            }
        }

        let token: TokenResponse = serde_json::from_value(value)?;
        tracing::debug!(app_id, expires_in = token.expires_in, "fetched fresh access token");
        Ok(token)
    }
}

/// `application/json`, optionally with parameters such as a charset.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

// ── Tests ──────────────────────────────────────────────────────
