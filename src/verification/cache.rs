/// Time-bounded storage for pending verification codes
use super::{PendingVerification, VerificationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Keyed cache with per-entry expiry
#[async_trait]
pub trait CodeCache: Send + Sync {
    /// Store an entry, replacing any previous one for the key
    async fn put(
        &self,
        key: &str,
        entry: &PendingVerification,
        ttl: Duration,
    ) -> Result<(), VerificationError>;

    async fn get(&self, key: &str) -> Result<Option<PendingVerification>, VerificationError>;

    /// Remove the entry only while it still holds `code`.
    /// Returns true for exactly one caller per stored entry.
    async fn remove(&self, key: &str, code: &str) -> Result<bool, VerificationError>;

    /// Drop entries that expired before `now`; returns how many
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, VerificationError>;

    fn backend_name(&self) -> &'static str;
}

/// Process-local cache
///
/// Lost on restart and not shared between instances.
#[derive(Default)]
pub struct MemoryCodeCache {
    entries: Mutex<HashMap<String, PendingVerification>>,
}

impl MemoryCodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CodeCache for MemoryCodeCache {
    async fn put(
        &self,
        key: &str,
        entry: &PendingVerification,
        _ttl: Duration,
    ) -> Result<(), VerificationError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<PendingVerification>, VerificationError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn remove(&self, key: &str, code: &str) -> Result<bool, VerificationError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.code == code => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, VerificationError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Deletes the key only if the stored entry still carries the given code
const REMOVE_IF_CODE: &str = r#"
local value = redis.call('GET', KEYS[1])
if value and cjson.decode(value).code == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Redis-backed cache, shared by every instance pointing at the same server
///
/// Entries carry a native Redis TTL, so sweeping is a no-op.
#[derive(Clone)]
pub struct RedisCodeCache {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisCodeCache {
    pub async fn connect(redis_url: &str) -> Result<Self, VerificationError> {
        info!("Connecting to Redis at {}", redis_url);

        let client = Client::open(redis_url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            VerificationError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            VerificationError::Cache(format!("Redis connection failed: {}", e))
        })?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            key_prefix: "lounge:verification:".to_string(),
        })
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CodeCache for RedisCodeCache {
    async fn put(
        &self,
        key: &str,
        entry: &PendingVerification,
        ttl: Duration,
    ) -> Result<(), VerificationError> {
        let cache_key = self.build_key(key);
        let json = serde_json::to_string(entry)
            .map_err(|e| VerificationError::Cache(format!("Serialization failed: {}", e)))?;

        debug!("Cache SET: {} (TTL: {}s)", cache_key, ttl.as_secs());

        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(&cache_key, json, ttl.as_secs().max(1))
            .await
            .map_err(|e| {
                warn!("Redis SET failed for {}: {}", cache_key, e);
                VerificationError::Cache(format!("Cache set failed: {}", e))
            })
    }

    async fn get(&self, key: &str) -> Result<Option<PendingVerification>, VerificationError> {
        let cache_key = self.build_key(key);

        let mut conn = self.connection.clone();
        let result: Option<String> = conn.get(&cache_key).await.map_err(|e| {
            warn!("Redis GET failed for {}: {}", cache_key, e);
            VerificationError::Cache(format!("Cache get failed: {}", e))
        })?;

        match result {
            Some(json) => match serde_json::from_str(&json) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    warn!("Dropping corrupt verification entry {}: {}", cache_key, e);
                    let _: Result<(), _> = conn.del(&cache_key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str, code: &str) -> Result<bool, VerificationError> {
        let cache_key = self.build_key(key);

        let mut conn = self.connection.clone();
        let removed: i64 = Script::new(REMOVE_IF_CODE)
            .key(&cache_key)
            .arg(code)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!("Redis conditional DEL failed for {}: {}", cache_key, e);
                VerificationError::Cache(format!("Cache delete failed: {}", e))
            })?;

        Ok(removed == 1)
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, VerificationError> {
        Ok(0)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
