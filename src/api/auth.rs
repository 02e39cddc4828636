/// Signup by emailed code, and password login
use crate::{
    api::{json_body, require_fields, validate_request},
    auth::{hash_password, verify_password, MIN_PASSWORD_LENGTH},
    context::AppContext,
    error::{AppError, AppResult},
    models::PublicUser,
};
use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/send-code", post(send_code))
        .route("/api/auth/verify-code", post(verify_code))
        .route("/api/auth/login", post(login))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendCodeRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 100, message = "Name is too long"))]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub message: String,
    pub user: PublicUser,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: PublicUser,
    pub token: String,
}

/// Issue a signup code and mail it
async fn send_code(
    State(ctx): State<AppContext>,
    payload: Result<Json<SendCodeRequest>, JsonRejection>,
) -> AppResult<Json<SendCodeResponse>> {
    let req = json_body(payload)?;
    require_fields(&[&req.email, &req.name, &req.password])?;
    validate_request(&req)?;
    if req.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    if ctx.repository.find_user_by_email(&req.email).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let code = ctx
        .verification
        .issue(&req.email, req.name.trim(), &password_hash)
        .await?;

    ctx.mailer
        .send_verification_code(
            req.email.trim(),
            req.name.trim(),
            &code,
            ctx.config.verification.code_ttl / 60,
        )
        .await?;

    tracing::info!("Verification code sent to {}", req.email.trim());

    Ok(Json(SendCodeResponse {
        success: true,
        message: "Verification code sent".to_string(),
        demo_code: ctx.config.verification.expose_code.then_some(code),
    }))
}

/// Redeem a code and create the account
async fn verify_code(
    State(ctx): State<AppContext>,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> AppResult<Json<VerifyCodeResponse>> {
    let req = json_body(payload)?;
    require_fields(&[&req.email, &req.code])?;

    let signup = ctx
        .verification
        .redeem(&req.email, req.code.trim())
        .await?;

    let user = ctx
        .repository
        .create_user(&signup.name, &signup.email, &signup.password_hash)
        .await?;
    let token = ctx.sessions.issue(&user)?;

    tracing::info!("Account created: {} ({})", user.id, user.email);

    Ok(Json(VerifyCodeResponse {
        message: "Account created".to_string(),
        user: PublicUser::from(&user),
        token,
    }))
}

async fn login(
    State(ctx): State<AppContext>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<SessionResponse>> {
    let req = json_body(payload)?;
    require_fields(&[&req.email, &req.password])?;

    let invalid = || AppError::Authentication("Invalid email or password".to_string());
    let user = ctx
        .repository
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = ctx.sessions.issue(&user)?;
    tracing::debug!("Login: {}", user.id);

    Ok(Json(SessionResponse {
        user: PublicUser::from(&user),
        token,
    }))
}
