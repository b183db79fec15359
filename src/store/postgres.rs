use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;
use uuid::Uuid;

use super::DocumentStore;
use crate::errors::StoreError;
use crate::models::{CachedToken, NewCachedToken};

/// Collection names become quoted table identifiers, so they are
/// restricted to a conservative identifier alphabet (max 63 bytes).
static COLLECTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

const UNDEFINED_TABLE: &str = "42P01";

/// PostgreSQL document store: one table per collection, `app_id UNIQUE`.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool. The caller keeps ownership of its lifecycle.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub fn validate_collection(name: &str) -> Result<&str, StoreError> {
    if COLLECTION_NAME.is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

fn create_table_sql(collection: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS "{collection}" (
            id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            app_id       TEXT NOT NULL UNIQUE,
            access_token TEXT NOT NULL,
            expires_at   BIGINT NOT NULL,
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    )
}

fn find_sql(collection: &str) -> String {
    format!(
        r#"SELECT id, app_id, access_token, expires_at FROM "{collection}" WHERE app_id = $1 LIMIT 1"#
    )
}

fn insert_sql(collection: &str) -> String {
    format!(
        r#"INSERT INTO "{collection}" (app_id, access_token, expires_at) VALUES ($1, $2, $3) RETURNING id"#
    )
}

fn update_sql(collection: &str) -> String {
    format!(
        r#"UPDATE "{collection}" SET app_id = $2, access_token = $3, expires_at = $4, updated_at = NOW() WHERE id = $1"#
    )
}

/// Map driver errors onto the store taxonomy.
fn classify(err: sqlx::Error, collection: &str, app_id: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Duplicate {
                app_id: app_id.to_string(),
            };
        }
        if db.code().as_deref() == Some(UNDEFINED_TABLE) {
            return StoreError::CollectionMissing(collection.to_string());
        }
    }
    StoreError::Database(err)
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    app_id: String,
    access_token: String,
    expires_at: i64,
}

impl From<TokenRow> for CachedToken {
    fn from(row: TokenRow) -> Self {
        CachedToken {
            id: Some(row.id.to_string()),
            app_id: row.app_id,
            access_token: row.access_token,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create_collection(&self, collection: &str) -> Result<(), StoreError> {
        let collection = validate_collection(collection)?;
        sqlx::query(&create_table_sql(collection))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_one_by_app_id(
        &self,
        collection: &str,
        app_id: &str,
    ) -> Result<Option<CachedToken>, StoreError> {
        let collection = validate_collection(collection)?;
        let row = sqlx::query_as::<_, TokenRow>(&find_sql(collection))
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, collection, app_id))?;
        Ok(row.map(CachedToken::from))
    }

    async fn insert(
        &self,
        collection: &str,
        record: &NewCachedToken,
    ) -> Result<CachedToken, StoreError> {
        let collection = validate_collection(collection)?;
        let id = sqlx::query_scalar::<_, Uuid>(&insert_sql(collection))
            .bind(&record.app_id)
            .bind(&record.access_token)
            .bind(record.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, collection, &record.app_id))?;
        Ok(record.clone().with_id(id.to_string()))
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        record: &NewCachedToken,
    ) -> Result<(), StoreError> {
        let collection = validate_collection(collection)?;
        let uuid = Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))?;
        let result = sqlx::query(&update_sql(collection))
            .bind(uuid)
            .bind(&record.app_id)
            .bind(&record.access_token)
            .bind(record.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, collection, &record.app_id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_collection() {
        assert!(validate_collection("accessToken").is_ok());
        assert!(validate_collection("_tokens_2").is_ok());
        assert!(validate_collection("").is_err());
        assert!(validate_collection("2tokens").is_err());
        assert!(validate_collection("access\"Token").is_err());
        assert!(validate_collection("tokens; DROP TABLE x").is_err());
        assert!(validate_collection(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_sql_quotes_collection_identifier() {
        assert!(create_table_sql("accessToken").contains(r#"CREATE TABLE IF NOT EXISTS "accessToken""#));
        assert!(create_table_sql("accessToken").contains("app_id       TEXT NOT NULL UNIQUE"));
        assert!(find_sql("accessToken").ends_with("WHERE app_id = $1 LIMIT 1"));
        assert!(insert_sql("accessToken").ends_with("RETURNING id"));
        assert!(update_sql("accessToken").contains(r#"UPDATE "accessToken""#));
    }

    #[test]
    fn test_classify_passes_through_non_database_errors() {
        let err = classify(sqlx::Error::RowNotFound, "accessToken", "wx1");
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }

    /// Round trip against a live database. Skipped unless
    /// TOKEN_CACHE_TEST_DATABASE_URL is set.
    #[tokio::test]
    async fn test_postgres_round_trip() {
        let Ok(url) = std::env::var("TOKEN_CACHE_TEST_DATABASE_URL") else {
            return;
        };
        let store = PgDocumentStore::connect(&url).await.unwrap();
        let collection = format!("token_cache_test_{}", Uuid::new_v4().simple());
        store.create_collection(&collection).await.unwrap();
        store.create_collection(&collection).await.unwrap();

        let record = NewCachedToken {
            app_id: "wx1".into(),
            access_token: "T1".into(),
            expires_at: 7_201_000,
        };
        let inserted = store.insert(&collection, &record).await.unwrap();
        let dup = store.insert(&collection, &record).await.unwrap_err();
        assert!(dup.is_duplicate());

        let updated = NewCachedToken {
            access_token: "T2".into(),
            ..record
        };
        store
            .update_by_id(&collection, inserted.id.as_deref().unwrap(), &updated)
            .await
            .unwrap();
        let found = store.find_one_by_app_id(&collection, "wx1").await.unwrap().unwrap();
        assert_eq!(found.access_token, "T2");
        assert_eq!(found.id, inserted.id);

        sqlx::query(&format!(r#"DROP TABLE "{collection}""#))
            .execute(store.pool())
            .await
            .unwrap();
    }
}
