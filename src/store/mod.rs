/// Object Storage System
///
/// A flat key-value store with prefix listing. Collections, media files and
/// chat attachments all live here under distinct key prefixes.
/// Supports multiple backend implementations (memory, disk, sqlite, remote).

pub mod disk;
pub mod keys;
pub mod memory;
pub mod remote;
pub mod sqlite;

pub use disk::DiskObjectStore;
pub use memory::MemoryObjectStore;
pub use remote::RemoteObjectStore;
pub use sqlite::SqliteObjectStore;

use crate::{
    config::StoreConfig,
    error::AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Listing entry for one stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Object storage backend trait
///
/// Keys are validated with [`keys::validate_key`] before they reach a backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, replacing any previous value
    async fn put(&self, key: &str, data: Vec<u8>) -> AppResult<()>;

    /// Retrieve an object
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// List every object whose key starts with `prefix`, ordered by key
    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>>;

    /// Store an object only if the key is free. Returns false when taken.
    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> AppResult<bool>;

    /// Replace an object only if its current bytes equal `expected`.
    /// Returns false when the object changed or no longer exists.
    async fn compare_and_swap(&self, key: &str, expected: &[u8], data: Vec<u8>)
        -> AppResult<bool>;

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;

    /// Direct URL for an object if the backend serves its own files
    fn public_url(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Build the configured backend
pub async fn open(config: &StoreConfig) -> AppResult<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config {
        StoreConfig::Memory => Arc::new(MemoryObjectStore::new()),
        StoreConfig::Disk {
            location,
            tmp_location,
        } => Arc::new(DiskObjectStore::new(location.clone(), tmp_location.clone()).await?),
        StoreConfig::Sqlite { path } => Arc::new(SqliteObjectStore::open(path).await?),
        StoreConfig::Remote { base_url, token } => {
            Arc::new(RemoteObjectStore::new(base_url.clone(), token.clone())?)
        }
    };

    tracing::info!("Object store backend: {}", store.backend_name());
    Ok(store)
}

