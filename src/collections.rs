/// Collections over the object store
///
/// A collection is every record whose key sits under one prefix. Listing is a
/// full scan; one unreadable record never fails the whole listing.
use crate::{
    error::{AppError, AppResult},
    metrics,
    models::Record,
    store::{keys, ObjectStore},
};
use futures::stream::{self, StreamExt};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Concurrent record fetches during a listing
const FETCH_CONCURRENCY: usize = 8;

/// Typed access to the records under one key prefix
pub struct Collection<T> {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            _record: PhantomData,
        }
    }

    /// Storage key of a record id
    pub fn key_for(&self, id: &str) -> String {
        keys::record_key(&self.prefix, id)
    }

    /// Every readable record in the collection, in key order
    ///
    /// Listing failures yield an empty set. Records that fail to fetch or
    /// parse are logged, counted and skipped. Nothing is retried.
    pub async fn list(&self) -> Vec<T> {
        self.fetch_all()
            .await
            .into_iter()
            .map(|(_, record)| record)
            .collect()
    }

    /// Targeted read of one record
    pub async fn get(&self, id: &str) -> AppResult<Option<T>> {
        Ok(self.get_raw(id).await?.map(|(record, _)| record))
    }

    /// Write a new record under its own key. A taken key is a conflict.
    pub async fn add(&self, record: T) -> AppResult<T> {
        let key = self.key_for(record.id());
        let data = serde_json::to_vec(&record)?;

        if !self.store.put_if_absent(&key, data).await? {
            return Err(AppError::Conflict(format!("Record {} already exists", key)));
        }

        metrics::record_store_write(&self.prefix);
        debug!("Stored record {}", key);
        Ok(record)
    }

    /// Apply `patch` to a stored record and write it back at the same key
    ///
    /// Returns `None` when no record has that id. The rewrite is a
    /// compare-and-swap against the bytes read, so a concurrent change
    /// surfaces as a conflict instead of being overwritten.
    pub async fn update<F>(&self, id: &str, patch: F) -> AppResult<Option<T>>
    where
        F: FnOnce(&mut T) -> AppResult<()>,
    {
        let Some((mut record, original)) = self.get_raw(id).await? else {
            return Ok(None);
        };

        patch(&mut record)?;
        if record.id() != id {
            return Err(AppError::Validation("Record id cannot change".to_string()));
        }

        let key = self.key_for(id);
        let data = serde_json::to_vec(&record)?;
        if !self.store.compare_and_swap(&key, &original, data).await? {
            return Err(AppError::Conflict(format!(
                "Record {} was modified concurrently",
                key
            )));
        }

        metrics::record_store_write(&self.prefix);
        Ok(Some(record))
    }

    /// Delete every record matching `predicate`; returns how many went
    ///
    /// Matching nothing is a no-op.
    pub async fn delete_where<P>(&self, predicate: P) -> AppResult<usize>
    where
        P: Fn(&T) -> bool,
    {
        let mut deleted = 0;
        for (key, record) in self.fetch_all().await {
            if predicate(&record) {
                self.store.delete(&key).await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            debug!("Deleted {} record(s) under {}", deleted, self.prefix);
        }
        Ok(deleted)
    }

    async fn get_raw(&self, id: &str) -> AppResult<Option<(T, Vec<u8>)>> {
        let key = self.key_for(id);
        match self.store.get(&key).await? {
            Some(data) => {
                let record = serde_json::from_slice(&data)?;
                Ok(Some((record, data)))
            }
            None => Ok(None),
        }
    }

    async fn fetch_all(&self) -> Vec<(String, T)> {
        let listing = match self.store.list(&keys::collection_prefix(&self.prefix)).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Failed to list collection {}: {}", self.prefix, e);
                metrics::record_collection_skip(&self.prefix);
                return Vec::new();
            }
        };

        let record_keys = listing
            .into_iter()
            .map(|info| info.key)
            .filter(|key| key.ends_with(keys::RECORD_SUFFIX));

        let fetched: Vec<(String, AppResult<Option<T>>)> = stream::iter(record_keys)
            .map(|key| async move {
                let result = self.fetch_record(&key).await;
                (key, result)
            })
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        fetched
            .into_iter()
            .filter_map(|(key, result)| match result {
                Ok(Some(record)) => Some((key, record)),
                // Deleted between listing and fetch
                Ok(None) => None,
                Err(e) => {
                    warn!("Skipping unreadable record {}: {}", key, e);
                    metrics::record_collection_skip(&self.prefix);
                    None
                }
            })
            .collect()
    }

    async fn fetch_record(&self, key: &str) -> AppResult<Option<T>> {
        match self.store.get(key).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

/// Sort records oldest first, ties broken by id
pub fn sort_oldest_first<T: Record>(records: &mut [T]) {
    records.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}
