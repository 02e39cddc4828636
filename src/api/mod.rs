/// API routes and handlers
pub mod auth;
pub mod chat;
pub mod health;
pub mod media;
pub mod middleware;
pub mod social;
pub mod users;

use crate::{
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart},
    http::StatusCode,
    Json, Router,
};
use validator::Validate;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(media::routes())
        .merge(social::routes())
        .merge(chat::routes())
        .merge(users::routes())
}

/// Unwrap a JSON body, turning axum's rejection into a 400
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Run derived `validator` rules and report the failures as one message
pub fn validate_request<T: Validate>(request: &T) -> AppResult<()> {
    request.validate().map_err(|errors| {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid {}", field),
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        AppError::Validation(message)
    })
}

/// Fail with "Missing required fields" if any value is blank
pub fn require_fields(values: &[&str]) -> AppResult<()> {
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(AppError::Validation("Missing required fields".to_string()));
    }
    Ok(())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// One file read from a multipart form
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Files and text fields of a multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<(String, UploadedFile)>,
    pub fields: Vec<(String, String)>,
}

impl UploadForm {
    /// Drain a multipart body; parts with a filename are files
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field.bytes().await.map_err(multipart_error)?;
                    form.files.push((
                        name,
                        UploadedFile {
                            file_name,
                            data: data.to_vec(),
                        },
                    ));
                }
                None => {
                    let value = field.text().await.map_err(multipart_error)?;
                    form.fields.push((name, value));
                }
            }
        }

        Ok(form)
    }

    /// Every file sent under `name`
    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        let (matching, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.files).into_iter().partition(|(n, _)| n == name);
        self.files = rest;
        matching.into_iter().map(|(_, file)| file).collect()
    }

    /// The first file sent under `name`
    pub fn take_file(&mut self, name: &str) -> AppResult<UploadedFile> {
        self.take_files(name)
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Validation(format!("No {} file provided", name)))
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}
