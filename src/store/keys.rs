/// Storage key construction
///
/// Every object key is a `/`-joined list of sanitized segments. Sanitizing
/// keeps keys safe as flat storage paths; two raw ids that sanitize to the
/// same string share a key prefix.
use crate::error::{AppError, AppResult};
use sha2::{Digest, Sha256};

/// Collection prefixes
pub mod prefixes {
    pub const PUBLIC_MESSAGES: &str = "public-messages";
    pub const PRIVATE_MESSAGES: &str = "private-messages";
    pub const USERS: &str = "users";
    pub const USER_EMAILS: &str = "user-emails";
    pub const MEDIA: &str = "media";
    pub const CHAT_MEDIA: &str = "chat-media";
    pub const VOICE: &str = "voice";
    pub const COMMENTS: &str = "comments";
    pub const LIKES: &str = "likes";
}

/// Suffix appended to every record key
pub const RECORD_SUFFIX: &str = ".json";

/// Replace every character outside `[A-Za-z0-9._-]` with `_`, then trim
/// leading and trailing underscores.
pub fn sanitize_segment(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    mapped.trim_matches('_').to_string()
}

/// Join sanitized segments with `/`, dropping segments that sanitize to nothing
pub fn build_key<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| sanitize_segment(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Key of one record inside a collection
pub fn record_key(prefix: &str, id: &str) -> String {
    format!("{}/{}{}", prefix, sanitize_segment(id), RECORD_SUFFIX)
}

/// Listing prefix for a collection root
pub fn collection_prefix(prefix: &str) -> String {
    format!("{}/", prefix)
}

/// Collection prefix scoped to one media item, e.g. `comments-<mediaId>`
pub fn media_scoped_prefix(kind: &str, media_id: &str) -> AppResult<String> {
    let sanitized = sanitize_segment(media_id);
    if sanitized.is_empty() {
        return Err(AppError::Validation(format!(
            "Invalid media id: {:?}",
            media_id
        )));
    }
    Ok(format!("{}-{}", kind, sanitized))
}

/// Key of the email uniqueness index entry for a user
///
/// Emails are trimmed and lowercased, then hashed so that distinct
/// addresses never collide after sanitizing.
pub fn email_index_key(email: &str) -> String {
    let normalized = normalize_email(email);
    let digest = Sha256::digest(normalized.as_bytes());
    format!(
        "{}/{}{}",
        prefixes::USER_EMAILS,
        hex::encode(digest),
        RECORD_SUFFIX
    )
}

/// Canonical form used to compare emails
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check that a key can be used as a storage path
pub fn validate_key(key: &str) -> AppResult<()> {
    if key.is_empty() {
        return Err(AppError::Validation("Object key cannot be empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(AppError::Validation(format!("Invalid object key: {}", key)));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(AppError::Validation(format!("Invalid object key: {}", key)));
        }
    }
    Ok(())
}

/// Last segment of a key
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Lowercased extension of a file name, without the dot
pub fn extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

/// Content type guessed from a key's extension
pub fn content_type_for(key: &str) -> &'static str {
    match extension(file_name(key)).as_str() {
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
