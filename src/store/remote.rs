/// Remote object store backend over HTTP
///
/// Talks to an object service exposing:
/// - `PUT    {base}/objects/{key}` (raw body; `If-None-Match: *` or `If-Match: "<etag>"`)
/// - `GET    {base}/objects/{key}`
/// - `DELETE {base}/objects/{key}`
/// - `GET    {base}/objects?prefix=...` returning `[{key, size, uploadedAt}]`
///
/// ETags are the hex SHA-256 of the object bytes. A failed precondition
/// answers 412.
use crate::{
    error::{AppError, AppResult},
    store::{keys::validate_key, ObjectInfo, ObjectStore},
};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use sha2::{Digest, Sha256};

pub struct RemoteObjectStore {
    base_url: String,
    token: Option<String>,
    http_client: Client,
}

impl RemoteObjectStore {
    pub fn new(base_url: String, token: Option<String>) -> AppResult<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("media-lounge/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http_client,
        })
    }

    fn object_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/objects/{}", self.base_url, encoded.join("/"))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Strong ETag for a body
    pub fn etag(data: &[u8]) -> String {
        format!("\"{}\"", hex::encode(Sha256::digest(data)))
    }

    async fn conditional_put(
        &self,
        key: &str,
        data: Vec<u8>,
        precondition: Option<(header::HeaderName, String)>,
    ) -> AppResult<bool> {
        validate_key(key)?;

        let mut request = self
            .authorize(self.http_client.put(self.object_url(key)))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        if let Some((name, value)) = precondition {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(storage_error)?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(AppError::Storage(format!(
                "Remote store rejected PUT {}: {}",
                key, status
            ))),
        }
    }
}

fn storage_error(e: reqwest::Error) -> AppError {
    AppError::Storage(format!("Remote store request failed: {}", e))
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> AppResult<()> {
        self.conditional_put(key, data, None).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;

        let response = self
            .authorize(self.http_client.get(self.object_url(key)))
            .send()
            .await
            .map_err(storage_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(storage_error)?;
                Ok(Some(bytes.to_vec()))
            }
            status => Err(AppError::Storage(format!(
                "Remote store rejected GET {}: {}",
                key, status
            ))),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;

        let response = self
            .authorize(self.http_client.delete(self.object_url(key)))
            .send()
            .await
            .map_err(storage_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(AppError::Storage(format!(
                "Remote store rejected DELETE {}: {}",
                key, status
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>> {
        let url = format!(
            "{}/objects?prefix={}",
            self.base_url,
            urlencoding::encode(prefix)
        );

        let response = self
            .authorize(self.http_client.get(url))
            .send()
            .await
            .map_err(storage_error)?;

        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "Remote store rejected listing {}: {}",
                prefix,
                response.status()
            )));
        }

        let mut objects: Vec<ObjectInfo> = response.json().await.map_err(storage_error)?;
        objects.retain(|o| o.key.starts_with(prefix));
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> AppResult<bool> {
        self.conditional_put(key, data, Some((header::IF_NONE_MATCH, "*".to_string())))
            .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        data: Vec<u8>,
    ) -> AppResult<bool> {
        self.conditional_put(key, data, Some((header::IF_MATCH, Self::etag(expected))))
            .await
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_segments() {
        let store = RemoteObjectStore::new("https://objects.example.com/".into(), None).unwrap();
        assert_eq!(
            store.object_url("media/my photo.png"),
            "https://objects.example.com/objects/media/my%20photo.png"
        );
    }

    #[test]
    fn test_etag_is_quoted_sha256() {
        let etag = RemoteObjectStore::etag(b"abc");
        assert_eq!(
            etag,
            "\"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\""
        );
    }
}
