/// SQLite object store backend
///
/// One table of `(key, data, size, uploaded_at)`. Conditional writes are
/// single statements, so they stay atomic across processes sharing the file.
use crate::{
    error::AppResult,
    store::{keys::validate_key, ObjectInfo, ObjectStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::Path;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

pub struct SqliteObjectStore {
    pool: SqlitePool,
}

impl SqliteObjectStore {
    /// Open (or create) the database file and ensure the schema
    pub async fn open(path: &Path) -> AppResult<Self> {
        let pool = create_pool(path, DatabaseOptions::default()).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> AppResult<Self> {
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> AppResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                key TEXT PRIMARY KEY NOT NULL,
                data BLOB NOT NULL,
                size INTEGER NOT NULL,
                uploaded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        test_connection(&pool).await?;
        Ok(Self { pool })
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> AppResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .busy_timeout(Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

fn timestamp_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> AppResult<()> {
        validate_key(key)?;
        let size = data.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO objects (key, data, size, uploaded_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                size = excluded.size,
                uploaded_at = excluded.uploaded_at
            "#,
        )
        .bind(key)
        .bind(data)
        .bind(size)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;

        let row = sqlx::query("SELECT data FROM objects WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get::<Vec<u8>, _>("data")?),
            None => None,
        })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;

        sqlx::query("DELETE FROM objects WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT key, size, uploaded_at FROM objects
            WHERE substr(key, 1, length(?1)) = ?1
            ORDER BY key
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> AppResult<ObjectInfo> {
                Ok(ObjectInfo {
                    key: row.try_get("key")?,
                    size: row.try_get::<i64, _>("size")?.max(0) as u64,
                    uploaded_at: timestamp_millis(row.try_get("uploaded_at")?),
                })
            })
            .collect()
    }

    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> AppResult<bool> {
        validate_key(key)?;
        let size = data.len() as i64;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO objects (key, data, size, uploaded_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(key)
        .bind(data)
        .bind(size)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        data: Vec<u8>,
    ) -> AppResult<bool> {
        validate_key(key)?;
        let size = data.len() as i64;

        let result = sqlx::query(
            r#"
            UPDATE objects SET data = ?1, size = ?2, uploaded_at = ?3
            WHERE key = ?4 AND data = ?5
            "#,
        )
        .bind(data)
        .bind(size)
        .bind(Utc::now().timestamp_millis())
        .bind(key)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_roundtrip_on_file() {
        let dir = tempdir().unwrap();
        let store = SqliteObjectStore::open(&dir.path().join("store.sqlite"))
            .await
            .unwrap();

        store.put("users/a.json", b"one".to_vec()).await.unwrap();
        store.put("users/a.json", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("users/a.json").await.unwrap(), Some(b"two".to_vec()));

        store.delete("users/a.json").await.unwrap();
        assert_eq!(store.get("users/a.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_prefix_does_not_treat_wildcards() {
        let store = SqliteObjectStore::in_memory().await.unwrap();
        store.put("likes-a_b/1.json", b"1".to_vec()).await.unwrap();
        store.put("likes-axb/2.json", b"2".to_vec()).await.unwrap();

        let listed = store.list("likes-a_b/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "likes-a_b/1.json");
        assert_eq!(listed[0].size, 1);
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let store = SqliteObjectStore::in_memory().await.unwrap();
        assert!(store.put_if_absent("k/v.json", b"a".to_vec()).await.unwrap());
        assert!(!store.put_if_absent("k/v.json", b"b".to_vec()).await.unwrap());
        assert!(!store
            .compare_and_swap("k/v.json", b"b", b"c".to_vec())
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("k/v.json", b"a", b"c".to_vec())
            .await
            .unwrap());
        assert_eq!(store.get("k/v.json").await.unwrap(), Some(b"c".to_vec()));
    }
}
