/// Object store backends and the document layer built on them
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use media_lounge::{
    error::{AppError, AppResult},
    models::{MessageBody, PublicUser},
    repository::Repository,
    store::{
        DiskObjectStore, MemoryObjectStore, ObjectInfo, ObjectStore, RemoteObjectStore,
        SqliteObjectStore,
    },
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Memory store whose reads fail for chosen keys
struct FlakyStore {
    inner: MemoryObjectStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryObjectStore::new(),
            failing: Mutex::new(HashSet::new()),
        }
    }

    fn fail_reads_of(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> AppResult<()> {
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(AppError::Storage(format!("injected failure for {}", key)));
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>> {
        self.inner.list(prefix).await
    }

    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> AppResult<bool> {
        self.inner.put_if_absent(key, data).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        data: Vec<u8>,
    ) -> AppResult<bool> {
        self.inner.compare_and_swap(key, expected, data).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

const OBJECT_TOKEN: &str = "object-token";

/// In-process object service speaking the remote store protocol
#[derive(Clone, Default)]
struct ObjectService {
    objects: Arc<Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {}", OBJECT_TOKEN).as_str())
}

async fn put_object(
    State(service): State<ObjectService>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut objects = service.objects.lock().unwrap();
    let current = objects
        .get(&key)
        .map(|(data, _)| RemoteObjectStore::etag(data));

    if headers.contains_key(header::IF_NONE_MATCH) && current.is_some() {
        return StatusCode::PRECONDITION_FAILED;
    }
    if let Some(expected) = headers.get(header::IF_MATCH) {
        if current.as_deref() != expected.to_str().ok() {
            return StatusCode::PRECONDITION_FAILED;
        }
    }

    objects.insert(key, (body.to_vec(), Utc::now()));
    StatusCode::CREATED
}

async fn get_object(
    State(service): State<ObjectService>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match service.objects.lock().unwrap().get(&key) {
        Some((data, _)) => data.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_object(
    State(service): State<ObjectService>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    match service.objects.lock().unwrap().remove(&key) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn list_objects(
    State(service): State<ObjectService>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let prefix = params.get("prefix").cloned().unwrap_or_default();
    let listing: Vec<ObjectInfo> = service
        .objects
        .lock()
        .unwrap()
        .iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .map(|(key, (data, uploaded_at))| ObjectInfo {
            key: key.clone(),
            size: data.len() as u64,
            uploaded_at: *uploaded_at,
        })
        .collect();
    Json(listing).into_response()
}

/// Serve an object service on an ephemeral port; returns its base URL
async fn spawn_object_service() -> String {
    let app = Router::new()
        .route("/objects", get(list_objects))
        .route(
            "/objects/*key",
            put(put_object).get(get_object).delete(delete_object),
        )
        .with_state(ObjectService::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

fn user(id: &str, name: &str) -> PublicUser {
    PublicUser {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", id),
        profile_picture: None,
        created_at: Utc::now(),
    }
}

fn text(content: &str) -> MessageBody {
    MessageBody::Text {
        content: content.to_string(),
    }
}

/// Behaviour every backend must share
async fn check_backend(store: Arc<dyn ObjectStore>) {
    let name = store.backend_name();

    assert_eq!(store.get("users/missing.json").await.unwrap(), None, "{}", name);

    store.put("users/b.json", b"b".to_vec()).await.unwrap();
    store.put("users/a.json", b"a".to_vec()).await.unwrap();
    store.put("usersx/c.json", b"c".to_vec()).await.unwrap();
    store.put("users/a.json", b"a2".to_vec()).await.unwrap();
    assert_eq!(
        store.get("users/a.json").await.unwrap(),
        Some(b"a2".to_vec()),
        "{}",
        name
    );

    let listed: Vec<String> = store
        .list("users/")
        .await
        .unwrap()
        .into_iter()
        .map(|info| info.key)
        .collect();
    assert_eq!(listed, vec!["users/a.json", "users/b.json"], "{}", name);
    assert!(store.list("nothing/").await.unwrap().is_empty(), "{}", name);

    assert!(store.put_if_absent("users/c.json", b"c".to_vec()).await.unwrap());
    assert!(!store.put_if_absent("users/c.json", b"x".to_vec()).await.unwrap());
    assert_eq!(store.get("users/c.json").await.unwrap(), Some(b"c".to_vec()));

    assert!(!store
        .compare_and_swap("users/c.json", b"stale", b"y".to_vec())
        .await
        .unwrap());
    assert!(store
        .compare_and_swap("users/c.json", b"c", b"y".to_vec())
        .await
        .unwrap());
    assert_eq!(store.get("users/c.json").await.unwrap(), Some(b"y".to_vec()));
    assert!(!store
        .compare_and_swap("users/gone.json", b"y", b"z".to_vec())
        .await
        .unwrap());

    store.delete("users/c.json").await.unwrap();
    store.delete("users/c.json").await.unwrap();
    assert_eq!(store.get("users/c.json").await.unwrap(), None, "{}", name);

    assert!(store.put("../escape.json", vec![1]).await.is_err(), "{}", name);
    assert!(store.get("users//a.json").await.is_err(), "{}", name);
}

#[tokio::test]
async fn test_memory_backend() {
    check_backend(Arc::new(MemoryObjectStore::new())).await;
}

#[tokio::test]
async fn test_disk_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskObjectStore::new(dir.path().join("objects"), dir.path().join("tmp"))
        .await
        .unwrap();
    check_backend(Arc::new(store)).await;
}

#[tokio::test]
async fn test_sqlite_backend() {
    check_backend(Arc::new(SqliteObjectStore::in_memory().await.unwrap())).await;
}

#[tokio::test]
async fn test_sqlite_backend_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteObjectStore::open(&dir.path().join("lounge.db"))
        .await
        .unwrap();
    check_backend(Arc::new(store)).await;
}

#[tokio::test]
async fn test_remote_backend() {
    let base_url = spawn_object_service().await;
    let store = RemoteObjectStore::new(base_url, Some(OBJECT_TOKEN.to_string())).unwrap();
    check_backend(Arc::new(store)).await;
}

#[tokio::test]
async fn test_remote_backend_reports_rejections() {
    let base_url = spawn_object_service().await;
    let store = RemoteObjectStore::new(base_url, None).unwrap();

    assert!(matches!(
        store.get("users/a.json").await,
        Err(AppError::Storage(_))
    ));
    assert!(store.put("users/a.json", vec![1]).await.is_err());
    assert!(store.list("users/").await.is_err());
}

#[tokio::test]
async fn test_remote_backend_documents() {
    let base_url = spawn_object_service().await;
    let store = RemoteObjectStore::new(base_url, Some(OBJECT_TOKEN.to_string())).unwrap();
    let repo = Repository::new(Arc::new(store));
    let ann = user("user_ann", "Ann");

    repo.add_like("media/cat.png", &ann).await.unwrap();
    repo.add_like("media/cat.png", &ann).await.unwrap();
    assert_eq!(repo.list_likes("media/cat.png").await.unwrap().len(), 1);

    repo.create_user("Bob", "bob@example.com", "hash").await.unwrap();
    let err = repo
        .create_user("Bobby", "BOB@example.com", "hash")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_comment_listing_survives_failed_fetch() {
    let store = Arc::new(FlakyStore::new());
    let repo = Repository::new(store.clone());
    let ann = user("user_ann", "Ann");

    for i in 0..5 {
        repo.add_comment("media/cat.png", &ann, &format!("comment {}", i))
            .await
            .unwrap();
    }

    let listing = store.list("comments-").await.unwrap();
    assert_eq!(listing.len(), 5);
    store.fail_reads_of(&listing[2].key);

    let comments = repo.list_comments("media/cat.png").await.unwrap();
    assert_eq!(comments.len(), 4);
}

#[tokio::test]
async fn test_like_is_recorded_once() {
    let repo = Repository::new(Arc::new(MemoryObjectStore::new()));
    let ann = user("user_ann", "Ann");

    let first = repo.add_like("media/cat.png", &ann).await.unwrap();
    let second = repo.add_like("media/cat.png", &ann).await.unwrap();
    assert_eq!(first.id, second.id);

    let likes = repo.list_likes("media/cat.png").await.unwrap();
    assert_eq!(likes.len(), 1);
    assert_eq!(likes[0].user_id, "user_ann");

    let summary = repo
        .like_summary("media/cat.png", Some("user_ann"))
        .await
        .unwrap();
    assert_eq!(summary.count, 1);
    assert!(summary.user_liked);
}

#[tokio::test]
async fn test_removing_missing_like_is_noop() {
    let repo = Repository::new(Arc::new(MemoryObjectStore::new()));
    let ann = user("user_ann", "Ann");
    repo.add_like("media/cat.png", &ann).await.unwrap();

    assert_eq!(repo.remove_like("media/cat.png", "user_bob").await.unwrap(), 0);
    assert_eq!(repo.remove_like("media/dog.png", "user_ann").await.unwrap(), 0);
    assert_eq!(repo.list_likes("media/cat.png").await.unwrap().len(), 1);

    assert_eq!(repo.remove_like("media/cat.png", "user_ann").await.unwrap(), 1);
    assert!(repo.list_likes("media/cat.png").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conversations_most_recent_first() {
    let repo = Repository::new(Arc::new(MemoryObjectStore::new()));
    let mut people = Vec::new();
    for name in ["ann", "bob", "cat"] {
        let created = repo
            .create_user(name, &format!("{}@example.com", name), "hash")
            .await
            .unwrap();
        people.push(PublicUser::from(&created));
    }
    let (ann, bob, cat) = (&people[0], &people[1], &people[2]);

    repo.add_private_message(ann, bob, text("hi bob")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    repo.add_private_message(cat, ann, text("hi ann")).await.unwrap();

    let conversations = repo.conversations_for(&ann.id).await;
    let order: Vec<&str> = conversations.iter().map(|c| c.user.id.as_str()).collect();
    assert_eq!(order, vec![cat.id.as_str(), bob.id.as_str()]);

    // Bob only talked to Ann
    let bobs = repo.conversations_for(&bob.id).await;
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].user.id, ann.id);
}

#[tokio::test]
async fn test_email_is_unique_case_insensitively() {
    let repo = Repository::new(Arc::new(MemoryObjectStore::new()));
    repo.create_user("Ann", "Ann@Example.com", "hash").await.unwrap();

    let err = repo
        .create_user("Other Ann", "ann@example.com ", "hash")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let found = repo.find_user_by_email("ANN@example.com").await.unwrap();
    assert_eq!(found.map(|u| u.name), Some("Ann".to_string()));
}
