/// Public room, private messages and chat attachments
use crate::{
    api::{json_body, UploadForm},
    auth::AuthUser,
    context::AppContext,
    error::{AppError, AppResult},
    models::{ConversationSummary, Message, MessageBody, PublicUser},
};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build chat routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/chat/public", get(list_public).post(post_public))
        .route("/api/chat/public/voice", post(post_public_voice))
        .route("/api/chat/private", get(list_private).post(post_private))
        .route("/api/chat/private/voice", post(post_private_voice))
        .route("/api/chat/upload", post(upload_attachment))
        .route("/api/chat/conversations", get(list_conversations))
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessageRequest {
    pub receiver_id: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateQuery {
    pub user1_id: Option<String>,
    pub user2_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationsQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub success: bool,
    pub url: String,
}

async fn find_receiver(ctx: &AppContext, receiver_id: &str) -> AppResult<PublicUser> {
    if receiver_id.trim().is_empty() {
        return Err(AppError::Validation("receiverId is required".to_string()));
    }
    ctx.repository
        .get_user(receiver_id)
        .await?
        .map(|user| PublicUser::from(&user))
        .ok_or_else(|| AppError::NotFound("Receiver not found".to_string()))
}

/// Store the `audio` part of a form as a voice clip
async fn voice_body(ctx: &AppContext, form: &mut UploadForm) -> AppResult<MessageBody> {
    let audio = form.take_file("audio")?;
    let voice_url = ctx.media.upload_voice(&audio.file_name, audio.data).await?;
    let content = form
        .field("content")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok(MessageBody::Voice { voice_url, content })
}

async fn list_public(State(ctx): State<AppContext>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: ctx.repository.list_public_messages().await,
    })
}

async fn post_public(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    payload: Result<Json<MessageBody>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let body = json_body(payload)?;
    let message = ctx.repository.add_public_message(&user, body).await?;
    Ok(Json(MessageResponse { message }))
}

async fn post_public_voice(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> AppResult<Json<MessageResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let body = voice_body(&ctx, &mut form).await?;
    let message = ctx.repository.add_public_message(&user, body).await?;
    Ok(Json(MessageResponse { message }))
}

/// Messages between two users; the caller must be one of them
async fn list_private(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Query(query): Query<PrivateQuery>,
) -> AppResult<Json<MessagesResponse>> {
    let (Some(user1), Some(user2)) = (query.user1_id, query.user2_id) else {
        return Err(AppError::Validation(
            "user1Id and user2Id are required".to_string(),
        ));
    };
    if user.id != user1 && user.id != user2 {
        return Err(AppError::Authorization(
            "Cannot read another user's conversation".to_string(),
        ));
    }

    let messages = ctx.repository.private_messages_between(&user1, &user2).await;
    Ok(Json(MessagesResponse { messages }))
}

async fn post_private(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    payload: Result<Json<PrivateMessageRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let req = json_body(payload)?;
    let receiver = find_receiver(&ctx, &req.receiver_id).await?;
    let message = ctx
        .repository
        .add_private_message(&user, &receiver, req.body)
        .await?;
    Ok(Json(MessageResponse { message }))
}

async fn post_private_voice(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> AppResult<Json<MessageResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let receiver_id = form.field("receiverId").unwrap_or_default().to_string();
    let receiver = find_receiver(&ctx, &receiver_id).await?;
    let body = voice_body(&ctx, &mut form).await?;

    let message = ctx
        .repository
        .add_private_message(&user, &receiver, body)
        .await?;
    Ok(Json(MessageResponse { message }))
}

async fn upload_attachment(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> AppResult<Json<AttachmentResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file")?;
    let url = ctx
        .media
        .upload_chat_attachment(&file.file_name, file.data)
        .await?;

    tracing::debug!("{} uploaded chat attachment {}", user.id, url);
    Ok(Json(AttachmentResponse { success: true, url }))
}

async fn list_conversations(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Query(query): Query<ConversationsQuery>,
) -> AppResult<Json<ConversationsResponse>> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("userId is required".to_string()))?;
    if user.id != user_id {
        return Err(AppError::Authorization(
            "Cannot list another user's conversations".to_string(),
        ));
    }

    Ok(Json(ConversationsResponse {
        conversations: ctx.repository.conversations_for(&user_id).await,
    }))
}
