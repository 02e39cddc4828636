/// Media library
///
/// Media files live under `media/` and are described by the object store's
/// own listing. Who uploaded a file is kept in a small side record under
/// `media-meta/`; files without one list as uploaded by "User".
use crate::{
    collections::Collection,
    error::{AppError, AppResult},
    metrics,
    models::{random_base36, MediaItem, MediaKind, Record},
    store::{
        keys::{self, prefixes},
        ObjectInfo, ObjectStore,
    },
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const MEDIA_META: &str = "media-meta";
const DEFAULT_UPLOADER: &str = "User";
const PUBLIC_PREFIXES: [&str; 3] = [prefixes::MEDIA, prefixes::CHAT_MEDIA, prefixes::VOICE];

/// Upload details not present in the store listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMeta {
    /// File name under `media/`
    id: String,
    original_name: String,
    uploaded_by: String,
    uploaded_by_id: String,
    created_at: DateTime<Utc>,
}

impl Record for MediaMeta {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Outcome of deleting one media id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub success: bool,
    pub deleted_count: usize,
    pub blob_deletion_results: Vec<DeleteResult>,
}

#[derive(Clone)]
pub struct MediaLibrary {
    store: Arc<dyn ObjectStore>,
    meta: Collection<MediaMeta>,
    public_url: String,
    upload_limit: usize,
}

/// Random part of stored file names, so equal names in one millisecond differ
const NAME_SUFFIX_LEN: usize = 6;

/// `<stem>-<millis>-<suffix>.<ext>`, sanitized
fn unique_name(original_name: &str, now: DateTime<Utc>, suffix: &str) -> String {
    let (stem, ext) = match original_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext.to_lowercase()),
        _ => (original_name, String::new()),
    };
    let stem = match keys::sanitize_segment(stem) {
        s if s.is_empty() => "file".to_string(),
        s => s,
    };

    if ext.is_empty() {
        format!("{}-{}-{}", stem, now.timestamp_millis(), suffix)
    } else {
        format!(
            "{}-{}-{}.{}",
            stem,
            now.timestamp_millis(),
            suffix,
            keys::sanitize_segment(&ext)
        )
    }
}

impl MediaLibrary {
    pub fn new(store: Arc<dyn ObjectStore>, public_url: &str, upload_limit: usize) -> Self {
        Self {
            meta: Collection::new(Arc::clone(&store), MEDIA_META),
            store,
            public_url: public_url.trim_end_matches('/').to_string(),
            upload_limit,
        }
    }

    pub fn upload_limit(&self) -> usize {
        self.upload_limit
    }

    /// URL clients use to fetch an object
    pub fn url_for(&self, key: &str) -> String {
        self.store.public_url(key).unwrap_or_else(|| {
            let encoded: Vec<String> = key
                .split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect();
            format!("{}/files/{}", self.public_url, encoded.join("/"))
        })
    }

    fn item_from(&self, info: &ObjectInfo, meta: Option<&MediaMeta>) -> MediaItem {
        let name = keys::file_name(&info.key).to_string();
        let extension = keys::extension(&name);

        MediaItem {
            id: info.key.clone(),
            original_name: meta
                .map(|m| m.original_name.clone())
                .unwrap_or_else(|| name.clone()),
            kind: MediaKind::from_extension(&extension),
            extension,
            url: self.url_for(&info.key),
            size: info.size,
            uploaded_at: info.uploaded_at,
            uploaded_by: meta
                .map(|m| m.uploaded_by.clone())
                .unwrap_or_else(|| DEFAULT_UPLOADER.to_string()),
            name,
        }
    }

    /// Every media file, newest first. Never fails.
    pub async fn list(&self) -> Vec<MediaItem> {
        let listing = match self.store.list(&keys::collection_prefix(prefixes::MEDIA)).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Failed to list media: {}", e);
                metrics::record_collection_skip(prefixes::MEDIA);
                return Vec::new();
            }
        };

        let meta: HashMap<String, MediaMeta> = self
            .meta
            .list()
            .await
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut items: Vec<MediaItem> = listing
            .iter()
            .map(|info| self.item_from(info, meta.get(keys::file_name(&info.key))))
            .collect();

        items.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    fn check_size(&self, original_name: &str, data: &[u8]) -> AppResult<()> {
        if data.is_empty() {
            return Err(AppError::Validation(format!("{} is empty", original_name)));
        }
        if data.len() > self.upload_limit {
            return Err(AppError::PayloadTooLarge(format!(
                "{} exceeds the {} byte upload limit",
                original_name, self.upload_limit
            )));
        }
        Ok(())
    }

    /// Store an image or video under `media/`
    pub async fn upload(
        &self,
        original_name: &str,
        data: Vec<u8>,
        uploader_id: &str,
        uploader_name: &str,
    ) -> AppResult<MediaItem> {
        self.check_size(original_name, &data)?;
        let ext = keys::extension(original_name);
        let kind = MediaKind::for_upload(&ext).ok_or_else(|| {
            AppError::Validation(format!("Unsupported file type: {}", original_name))
        })?;

        let now = Utc::now();
        let name = unique_name(original_name, now, &random_base36(NAME_SUFFIX_LEN));
        let key = keys::build_key(&[prefixes::MEDIA, name.as_str()]);
        let size = data.len() as u64;

        if !self.store.put_if_absent(&key, data).await? {
            return Err(AppError::Conflict(format!("{} already exists", key)));
        }

        let meta = MediaMeta {
            id: name,
            original_name: original_name.to_string(),
            uploaded_by: uploader_name.to_string(),
            uploaded_by_id: uploader_id.to_string(),
            created_at: now,
        };
        // The file is already stored; missing metadata only loses attribution
        if let Err(e) = self.meta.add(meta.clone()).await {
            warn!("Failed to record metadata for {}: {}", key, e);
        }

        metrics::record_media_upload(match kind {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        });
        info!("Uploaded {} ({} bytes) as {}", original_name, size, key);

        let info = ObjectInfo {
            key,
            size,
            uploaded_at: now,
        };
        Ok(self.item_from(&info, Some(&meta)))
    }

    /// Store a chat attachment; returns its URL
    pub async fn upload_chat_attachment(
        &self,
        original_name: &str,
        data: Vec<u8>,
    ) -> AppResult<String> {
        self.store_attachment(prefixes::CHAT_MEDIA, "chat-media", original_name, data)
            .await
    }

    /// Store a voice clip; returns its URL
    pub async fn upload_voice(&self, original_name: &str, data: Vec<u8>) -> AppResult<String> {
        self.store_attachment(prefixes::VOICE, "voice", original_name, data)
            .await
    }

    async fn store_attachment(
        &self,
        prefix: &str,
        label: &str,
        original_name: &str,
        data: Vec<u8>,
    ) -> AppResult<String> {
        self.check_size(original_name, &data)?;

        let name = format!(
            "{}-{}-{}-{}",
            label,
            Utc::now().timestamp_millis(),
            random_base36(NAME_SUFFIX_LEN),
            keys::sanitize_segment(original_name)
        );
        let key = keys::build_key(&[prefix, name.as_str()]);

        if !self.store.put_if_absent(&key, data).await? {
            return Err(AppError::Conflict(format!("{} already exists", key)));
        }

        metrics::record_media_upload(label);
        Ok(self.url_for(&key))
    }

    /// Delete media files by id, concurrently; each id reports separately
    pub async fn delete(&self, ids: &[String]) -> DeleteReport {
        let results = join_all(ids.iter().map(|id| self.delete_one(id))).await;
        let deleted_count = results.iter().filter(|r| r.success).count();

        if deleted_count < results.len() {
            warn!(
                "Media deletion: {} succeeded, {} failed",
                deleted_count,
                results.len() - deleted_count
            );
        }

        DeleteReport {
            success: true,
            deleted_count,
            blob_deletion_results: results,
        }
    }

    async fn delete_one(&self, id: &str) -> DeleteResult {
        let outcome = async {
            if !id.starts_with(&keys::collection_prefix(prefixes::MEDIA)) {
                return Err(AppError::Validation(format!("{} is not a media id", id)));
            }
            keys::validate_key(id)?;
            self.store.delete(id).await?;

            let name = keys::file_name(id);
            if let Err(e) = self.meta.delete_where(|m| m.id == name).await {
                warn!("Failed to remove metadata for {}: {}", id, e);
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => DeleteResult {
                id: id.to_string(),
                success: true,
                error: None,
            },
            Err(e) => DeleteResult {
                id: id.to_string(),
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Raw bytes of an uploaded file, for `/files`
    ///
    /// Only upload prefixes are served; records such as users stay private.
    pub async fn read(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        keys::validate_key(key)?;
        let public = PUBLIC_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(&keys::collection_prefix(prefix)));
        if !public {
            return Ok(None);
        }
        self.store.get(key).await
    }
}
