/// Media library endpoints and raw file serving
use crate::{
    api::{json_body, UploadForm},
    auth::AuthUser,
    context::AppContext,
    error::{AppError, AppResult},
    media::DeleteReport,
    models::MediaItem,
    store::keys,
};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build media routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/media", get(list_media).delete(delete_media))
        .route("/api/upload", post(upload_media))
        .route("/files/*key", get(serve_file))
}

#[derive(Debug, Serialize)]
pub struct MediaListResponse {
    pub media: Vec<MediaItem>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub files: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMediaRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

async fn list_media(State(ctx): State<AppContext>) -> Json<MediaListResponse> {
    Json(MediaListResponse {
        media: ctx.media.list().await,
    })
}

/// Upload one or more files sent as `files`
async fn upload_media(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let uploads = form.take_files("files");
    if uploads.is_empty() {
        return Err(AppError::Validation("No files uploaded".to_string()));
    }

    let mut files = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let item = ctx
            .media
            .upload(&upload.file_name, upload.data, &user.id, &user.name)
            .await?;
        files.push(item);
    }

    tracing::info!("{} uploaded {} file(s)", user.id, files.len());
    Ok(Json(UploadResponse {
        success: true,
        files,
    }))
}

async fn delete_media(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    payload: Result<Json<DeleteMediaRequest>, JsonRejection>,
) -> AppResult<Json<DeleteReport>> {
    let req = json_body(payload)?;
    if req.ids.is_empty() {
        return Err(AppError::Validation("No media ids provided".to_string()));
    }

    tracing::info!("{} deleting {} media file(s)", user.id, req.ids.len());
    Ok(Json(ctx.media.delete(&req.ids).await))
}

async fn serve_file(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let data = ctx
        .media
        .read(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File not found: {}", key)))?;

    Ok(([(header::CONTENT_TYPE, keys::content_type_for(&key))], data))
}
