/// Stored records and API views
///
/// Every record is one JSON object in the object store, with camelCase
/// field names.
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Longest accepted message or comment text, in characters
pub const MAX_TEXT_LENGTH: usize = 4000;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate `<kind>_<unix millis>_<9 random base36 chars>`
///
/// Collision resistant, not collision proof; inserts still go through
/// `put_if_absent`.
pub fn generate_id(kind: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}_{}", kind, now.timestamp_millis(), random_base36(9))
}

/// `len` random base36 characters
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Anything stored as one record in a collection
pub trait Record: Serialize + serde::de::DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for User {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// User without credentials, safe to return to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            profile_picture: user.profile_picture.clone(),
            created_at: user.created_at,
        }
    }
}

/// Partial profile update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub profile_picture: Option<String>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) -> AppResult<()> {
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("Name cannot be empty".to_string()));
            }
            user.name = name.to_string();
        }
        if let Some(picture) = &self.profile_picture {
            user.profile_picture = if picture.trim().is_empty() {
                None
            } else {
                Some(picture.trim().to_string())
            };
        }
        Ok(())
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Message payload, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Voice {
        voice_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        media_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Video {
        media_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Text { .. } => "text",
            MessageBody::Voice { .. } => "voice",
            MessageBody::Image { .. } => "image",
            MessageBody::Video { .. } => "video",
        }
    }

    /// Reject empty or oversized payloads
    pub fn validate(&self) -> AppResult<()> {
        let (url, content) = match self {
            MessageBody::Text { content } => {
                if content.trim().is_empty() {
                    return Err(AppError::Validation(
                        "Text messages need content".to_string(),
                    ));
                }
                (None, Some(content))
            }
            MessageBody::Voice { voice_url, content } => (Some(voice_url), content.as_ref()),
            MessageBody::Image { media_url, content } | MessageBody::Video { media_url, content } => {
                (Some(media_url), content.as_ref())
            }
        };

        if let Some(url) = url {
            if url.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "{} messages need a URL",
                    self.kind()
                )));
            }
        }
        if let Some(content) = content {
            if content.chars().count() > MAX_TEXT_LENGTH {
                return Err(AppError::Validation("Message is too long".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(flatten)]
    pub body: MessageBody,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Private messages carry both receiver fields, public ones neither
    pub fn is_private(&self) -> bool {
        self.receiver_id.is_some() && self.receiver_name.is_some()
    }

    pub fn is_public(&self) -> bool {
        self.receiver_id.is_none() && self.receiver_name.is_none()
    }

    /// Whether this message was exchanged between the two users, either way
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        match self.receiver_id.as_deref() {
            Some(receiver) => {
                (self.sender_id == a && receiver == b) || (self.sender_id == b && receiver == a)
            }
            None => false,
        }
    }

    /// The other participant of a private message, from `user_id`'s side
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        let receiver = self.receiver_id.as_deref()?;
        if self.sender_id == user_id {
            Some(receiver)
        } else if receiver == user_id {
            Some(self.sender_id.as_str())
        } else {
            None
        }
    }
}

impl Record for Message {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// =============================================================================
// Comments and likes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub media_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile_picture: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Comment {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub media_id: String,
    pub user_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

impl Like {
    /// Like ids are `like_<userId>_<unix millis>`
    pub fn id_for(user_id: &str, now: DateTime<Utc>) -> String {
        format!("like_{}_{}", user_id, now.timestamp_millis())
    }
}

impl Record for Like {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Like summary for one media item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSummary {
    pub likes: Vec<Like>,
    pub count: usize,
    pub user_liked: bool,
}

// =============================================================================
// Media
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    const VIDEO_EXTENSIONS: [&'static str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];
    const IMAGE_EXTENSIONS: [&'static str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "svg"];

    /// Kind shown in listings: anything that is not a known video is an image
    pub fn from_extension(ext: &str) -> Self {
        if Self::VIDEO_EXTENSIONS.contains(&ext) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    /// Kind accepted for upload, if any
    pub fn for_upload(ext: &str) -> Option<Self> {
        if Self::VIDEO_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Video)
        } else if Self::IMAGE_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

/// Media file as seen through the object store listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Object key; comments and likes hang off this id
    pub id: String,
    pub name: String,
    pub original_name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub extension: String,
    pub url: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}

/// Counterpart entry in a user's conversation list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub user: PublicUser,
    pub last_message_at: DateTime<Utc>,
}
