/// User lookup and profile updates
use crate::{
    api::json_body,
    auth::AuthUser,
    context::AppContext,
    error::{AppError, AppResult},
    models::{PublicUser, UserPatch},
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

const SEARCH_LIMIT: usize = 50;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users", get(search_users))
        .route("/api/users/me", put(update_me))
        .route("/api/users/:id", get(get_user))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<PublicUser>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: PublicUser,
}

async fn search_users(
    State(ctx): State<AppContext>,
    Query(query): Query<SearchQuery>,
) -> Json<UsersResponse> {
    Json(UsersResponse {
        users: ctx.repository.search_users(&query.q, SEARCH_LIMIT).await,
    })
}

async fn get_user(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let user = ctx
        .repository
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User not found: {}", id)))?;
    Ok(Json(UserResponse {
        user: PublicUser::from(&user),
    }))
}

async fn update_me(
    State(ctx): State<AppContext>,
    AuthUser(me): AuthUser,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let patch = json_body(payload)?;
    let user = ctx
        .repository
        .update_user(&me.id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Account no longer exists".to_string()))?;

    tracing::info!("Profile updated: {}", user.id);
    Ok(Json(UserResponse {
        user: PublicUser::from(&user),
    }))
}
