/// In-process object store backend
use crate::{
    error::AppResult,
    store::{keys::validate_key, ObjectInfo, ObjectStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

struct StoredObject {
    data: Vec<u8>,
    uploaded_at: DateTime<Utc>,
}

/// Memory storage backend
///
/// Objects are kept in an ordered map so prefix listing is a range scan.
/// Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> AppResult<()> {
        validate_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                uploaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.objects.read().await.get(key).map(|o| o.data.clone()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: object.data.len() as u64,
                uploaded_at: object.uploaded_at,
            })
            .collect())
    }

    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> AppResult<bool> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                uploaded_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        data: Vec<u8>,
    ) -> AppResult<bool> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        match objects.get_mut(key) {
            Some(object) if object.data == expected => {
                object.data = data;
                object.uploaded_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_prefix_scoped() {
        let store = MemoryObjectStore::new();
        store.put("likes-a/1.json", b"1".to_vec()).await.unwrap();
        store.put("likes-a/2.json", b"2".to_vec()).await.unwrap();
        store.put("likes-ab/3.json", b"3".to_vec()).await.unwrap();
        store.put("media/x.png", b"4".to_vec()).await.unwrap();

        let keys: Vec<String> = store
            .list("likes-a/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["likes-a/1.json", "likes-a/2.json"]);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let store = MemoryObjectStore::new();
        assert!(store.put_if_absent("users/u.json", b"v1".to_vec()).await.unwrap());
        assert!(!store.put_if_absent("users/u.json", b"v2".to_vec()).await.unwrap());

        assert!(!store
            .compare_and_swap("users/u.json", b"stale", b"v3".to_vec())
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("users/u.json", b"v1", b"v3".to_vec())
            .await
            .unwrap());
        assert_eq!(store.get("users/u.json").await.unwrap(), Some(b"v3".to_vec()));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let store = MemoryObjectStore::new();
        assert!(store.put("../escape", b"x".to_vec()).await.is_err());
    }
}
