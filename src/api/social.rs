/// Comments and likes on media items
use crate::{
    api::json_body,
    auth::{AuthUser, OptionalAuthUser},
    context::AppContext,
    error::{AppError, AppResult},
    models::{Comment, LikeSummary},
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build comment and like routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/media/comments", get(list_comments).post(add_comment))
        .route("/api/media/likes", get(get_likes).post(toggle_like))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaQuery {
    pub media_id: Option<String>,
    pub user_id: Option<String>,
}

impl MediaQuery {
    fn media_id(&self) -> AppResult<&str> {
        self.media_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::Validation("mediaId is required".to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentRequest {
    #[serde(default)]
    pub media_id: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub media_id: String,
    pub action: LikeAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub success: bool,
    pub count: usize,
    pub user_liked: bool,
}

async fn list_comments(
    State(ctx): State<AppContext>,
    Query(query): Query<MediaQuery>,
) -> AppResult<Json<CommentsResponse>> {
    let comments = ctx.repository.list_comments(query.media_id()?).await?;
    Ok(Json(CommentsResponse { comments }))
}

async fn add_comment(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    payload: Result<Json<AddCommentRequest>, JsonRejection>,
) -> AppResult<Json<CommentResponse>> {
    let req = json_body(payload)?;
    if req.media_id.trim().is_empty() {
        return Err(AppError::Validation("mediaId is required".to_string()));
    }

    let comment = ctx
        .repository
        .add_comment(&req.media_id, &user, &req.content)
        .await?;
    Ok(Json(CommentResponse { comment }))
}

/// `userLiked` is for `userId` when given, else for the signed-in caller
async fn get_likes(
    State(ctx): State<AppContext>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Query(query): Query<MediaQuery>,
) -> AppResult<Json<LikeSummary>> {
    let user_id = query
        .user_id
        .as_deref()
        .or(viewer.as_ref().map(|user| user.id.as_str()));
    let summary = ctx
        .repository
        .like_summary(query.media_id()?, user_id)
        .await?;
    Ok(Json(summary))
}

async fn toggle_like(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> AppResult<Json<LikeResponse>> {
    let req = json_body(payload)?;
    if req.media_id.trim().is_empty() {
        return Err(AppError::Validation("mediaId is required".to_string()));
    }

    match req.action {
        LikeAction::Like => {
            ctx.repository.add_like(&req.media_id, &user).await?;
        }
        LikeAction::Unlike => {
            ctx.repository.remove_like(&req.media_id, &user.id).await?;
        }
    }

    let summary = ctx
        .repository
        .like_summary(&req.media_id, Some(&user.id))
        .await?;
    Ok(Json(LikeResponse {
        success: true,
        count: summary.count,
        user_liked: summary.user_liked,
    }))
}
