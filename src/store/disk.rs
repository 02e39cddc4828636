/// Disk-based object store backend
use crate::{
    error::{AppError, AppResult},
    store::{keys::validate_key, ObjectInfo, ObjectStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};

/// Disk storage backend
///
/// Each key maps to a file below `base_path`, with `/` separated segments
/// becoming directories. Writes go to `tmp_path` first and are renamed into
/// place, so readers never see a partial object. Conditional writes are
/// serialized by a process-wide lock; two processes sharing one directory
/// can still race.
pub struct DiskObjectStore {
    base_path: PathBuf,
    tmp_path: PathBuf,
    write_lock: Mutex<()>,
}

impl DiskObjectStore {
    /// Create a new disk storage backend, creating its directories
    pub async fn new(base_path: PathBuf, tmp_path: PathBuf) -> AppResult<Self> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            AppError::Storage(format!("Failed to create store directory: {}", e))
        })?;
        fs::create_dir_all(&tmp_path).await.map_err(|e| {
            AppError::Storage(format!("Failed to create temp directory: {}", e))
        })?;

        Ok(Self {
            base_path,
            tmp_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the file path for a key
    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.base_path.clone(), |path, segment| path.join(segment))
    }

    /// Write through a temp file and rename into place
    async fn write_object(&self, key: &str, data: Vec<u8>) -> AppResult<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Storage(format!("Failed to create directory for {}: {}", key, e))
            })?;
        }

        let tmp = self.tmp_path.join(uuid::Uuid::new_v4().to_string());
        fs::write(&tmp, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write object {}: {}", key, e)))?;

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(AppError::Storage(format!(
                "Failed to move object {} into place: {}",
                key, e
            )));
        }

        Ok(())
    }

    async fn read_object(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        match fs::read(self.object_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to read object {}: {}",
                key, e
            ))),
        }
    }

    /// Key of a file below the base path
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        Some(segments?.join("/"))
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> AppResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;
        self.write_object(key, data).await
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;
        self.read_object(key).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete object {}: {}",
                key, e
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>> {
        // Walk only the deepest directory fully named by the prefix
        let root = match prefix.rfind('/') {
            Some(idx) => self.object_path(&prefix[..idx]),
            None => self.base_path.clone(),
        };

        let mut results = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(AppError::Storage(format!(
                        "Failed to list {:?}: {}",
                        dir, e
                    )))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;

                if metadata.is_dir() {
                    if path != self.tmp_path {
                        pending.push(path);
                    }
                    continue;
                }

                let Some(key) = self.key_for(&path) else {
                    tracing::warn!("Skipping non UTF-8 path in object store: {:?}", path);
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }

                let uploaded_at = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                results.push(ObjectInfo {
                    key,
                    size: metadata.len(),
                    uploaded_at,
                });
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> AppResult<bool> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;

        if fs::try_exists(self.object_path(key)).await? {
            return Ok(false);
        }
        self.write_object(key, data).await?;
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        data: Vec<u8>,
    ) -> AppResult<bool> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;

        match self.read_object(key).await? {
            Some(current) if current == expected => {
                self.write_object(key, data).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn backend(dir: &tempfile::TempDir) -> DiskObjectStore {
        DiskObjectStore::new(dir.path().join("objects"), dir.path().join("tmp"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get_object() {
        let dir = tempdir().unwrap();
        let store = backend(&dir).await;

        let data = b"{\"id\":\"1\"}".to_vec();
        store.put("users/user_1.json", data.clone()).await.unwrap();

        let retrieved = store.get("users/user_1.json").await.unwrap();
        assert_eq!(retrieved, Some(data));
        assert!(dir.path().join("objects/users/user_1.json").exists());
    }

    #[tokio::test]
    async fn test_get_nonexistent_object() {
        let dir = tempdir().unwrap();
        let store = backend(&dir).await;

        assert_eq!(store.get("users/missing.json").await.unwrap(), None);
        store.delete("users/missing.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let dir = tempdir().unwrap();
        let store = backend(&dir).await;

        store.put("comments-a/c1.json", b"1".to_vec()).await.unwrap();
        store.put("comments-a/c2.json", b"22".to_vec()).await.unwrap();
        store.put("comments-ab/c3.json", b"3".to_vec()).await.unwrap();

        let listed = store.list("comments-a/").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["comments-a/c1.json", "comments-a/c2.json"]);
        assert_eq!(listed[1].size, 2);

        let all = store.list("comments-").await.unwrap();
        assert_eq!(all.len(), 3);

        assert!(store.list("nothing-here/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let dir = tempdir().unwrap();
        let store = backend(&dir).await;

        assert!(store.put_if_absent("users/u.json", b"a".to_vec()).await.unwrap());
        assert!(!store.put_if_absent("users/u.json", b"b".to_vec()).await.unwrap());
        assert!(store
            .compare_and_swap("users/u.json", b"a", b"c".to_vec())
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap("users/u.json", b"a", b"d".to_vec())
            .await
            .unwrap());
        assert_eq!(store.get("users/u.json").await.unwrap(), Some(b"c".to_vec()));
    }
}
