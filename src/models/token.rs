// Token records shared by both cache tiers, and the issuer's response shape.

use serde::{Deserialize, Serialize};

/// A cached access token, as held in the document store or the memory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    /// Store row identity. Memory-only copies carry `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub app_id: String,
    pub access_token: String,
    /// Absolute expiry, epoch milliseconds.
    pub expires_at: i64,
}

impl CachedToken {
    /// A token is valid strictly before its expiry instant.
    pub fn is_valid_at(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at
    }

    /// Copy without the store id, suitable for the memory slot.
    pub fn detached(&self) -> Self {
        Self {
            id: None,
            ..self.clone()
        }
    }
}

/// Record fields written by `insert` and `update_by_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCachedToken {
    pub app_id: String,
    pub access_token: String,
    pub expires_at: i64,
}

impl NewCachedToken {
    pub fn with_id(self, id: impl Into<String>) -> CachedToken {
        CachedToken {
            id: Some(id.into()),
            app_id: self.app_id,
            access_token: self.access_token,
            expires_at: self.expires_at,
        }
    }

    pub fn into_detached(self) -> CachedToken {
        CachedToken {
            id: None,
            app_id: self.app_id,
            access_token: self.access_token,
            expires_at: self.expires_at,
        }
    }
}

/// Body returned by the token-issuing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Time-to-live in seconds.
    pub expires_in: u64,
}

impl TokenResponse {
    /// Build the record to persist, anchored at the fetch instant.
    pub fn into_record(self, app_id: &str, now_millis: i64) -> NewCachedToken {
        let ttl_millis = i64::try_from(self.expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        NewCachedToken {
            app_id: app_id.to_string(),
            access_token: self.access_token,
            expires_at: now_millis.saturating_add(ttl_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let token = CachedToken {
            id: Some("1".into()),
            app_id: "wx1".into(),
            access_token: "T1".into(),
            expires_at: 7_201_000,
        };
        assert!(token.is_valid_at(7_200_999));
        assert!(!token.is_valid_at(7_201_000));
    }

    #[test]
    fn test_into_record_computes_absolute_expiry() {
        let resp = TokenResponse {
            access_token: "T1".into(),
            expires_in: 7200,
        };
        let record = resp.into_record("wx1", 1_000);
        assert_eq!(record.expires_at, 7_201_000);
        assert_eq!(record.app_id, "wx1");
        assert_eq!(record.access_token, "T1");
    }

    #[test]
    fn test_into_record_saturates() {
        let resp = TokenResponse {
            access_token: "T".into(),
            expires_in: u64::MAX,
        };
        assert_eq!(resp.into_record("wx1", 5).expires_at, i64::MAX);
    }

    #[test]
    fn test_detached_drops_id() {
        let token = NewCachedToken {
            app_id: "wx1".into(),
            access_token: "T1".into(),
            expires_at: 10,
        }
        .with_id("row-1");
        assert_eq!(token.id.as_deref(), Some("row-1"));
        assert_eq!(token.detached().id, None);
    }

    #[test]
    fn test_token_response_deserializes_issuer_payload() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token":"ACCESS","expires_in":7200}"#).unwrap();
        assert_eq!(resp.expires_in, 7200);
    }
}
