/// Document repository
///
/// Typed entity operations over the object store: public and private
/// messages, per-media comments and likes, and users.
use crate::{
    collections::{sort_oldest_first, Collection},
    conversations::derive_conversations,
    error::{AppError, AppResult},
    models::{
        generate_id, Comment, ConversationSummary, Like, LikeSummary, Message, MessageBody,
        PublicUser, User, UserPatch, MAX_TEXT_LENGTH,
    },
    store::{
        keys::{self, prefixes},
        ObjectStore,
    },
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Body of a `user-emails/` index entry
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailIndexEntry {
    user_id: String,
}

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn ObjectStore>,
    public_messages: Collection<Message>,
    private_messages: Collection<Message>,
    users: Collection<User>,
}

impl Repository {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            public_messages: Collection::new(Arc::clone(&store), prefixes::PUBLIC_MESSAGES),
            private_messages: Collection::new(Arc::clone(&store), prefixes::PRIVATE_MESSAGES),
            users: Collection::new(Arc::clone(&store), prefixes::USERS),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn comments(&self, media_id: &str) -> AppResult<Collection<Comment>> {
        let prefix = keys::media_scoped_prefix(prefixes::COMMENTS, media_id)?;
        Ok(Collection::new(Arc::clone(&self.store), prefix))
    }

    fn likes(&self, media_id: &str) -> AppResult<Collection<Like>> {
        let prefix = keys::media_scoped_prefix(prefixes::LIKES, media_id)?;
        Ok(Collection::new(Arc::clone(&self.store), prefix))
    }

    // =========================================================================
    // Public chat
    // =========================================================================

    /// Public room history, oldest first
    pub async fn list_public_messages(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .public_messages
            .list()
            .await
            .into_iter()
            .filter(|m| {
                if !m.is_public() {
                    warn!("Skipping public message {} with receiver fields", m.id);
                }
                m.is_public()
            })
            .collect();
        sort_oldest_first(&mut messages);
        messages
    }

    pub async fn add_public_message(
        &self,
        sender: &PublicUser,
        body: MessageBody,
    ) -> AppResult<Message> {
        body.validate()?;
        let now = Utc::now();

        let message = Message {
            id: generate_id("msg", now),
            body,
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            sender_profile_picture: sender.profile_picture.clone(),
            receiver_id: None,
            receiver_name: None,
            created_at: now,
        };
        self.public_messages.add(message).await
    }

    // =========================================================================
    // Private chat
    // =========================================================================

    /// Every well-formed private message in the system
    pub async fn list_private_messages(&self) -> Vec<Message> {
        self.private_messages
            .list()
            .await
            .into_iter()
            .filter(|m| {
                if !m.is_private() {
                    warn!("Skipping private message {} without a receiver", m.id);
                }
                m.is_private()
            })
            .collect()
    }

    /// Thread between two users in either direction, oldest first
    pub async fn private_messages_between(&self, user1: &str, user2: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .list_private_messages()
            .await
            .into_iter()
            .filter(|m| m.is_between(user1, user2))
            .collect();
        sort_oldest_first(&mut messages);
        messages
    }

    pub async fn add_private_message(
        &self,
        sender: &PublicUser,
        receiver: &PublicUser,
        body: MessageBody,
    ) -> AppResult<Message> {
        body.validate()?;
        if sender.id == receiver.id {
            return Err(AppError::Validation(
                "Cannot send a private message to yourself".to_string(),
            ));
        }
        let now = Utc::now();

        let message = Message {
            id: generate_id("msg", now),
            body,
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            sender_profile_picture: sender.profile_picture.clone(),
            receiver_id: Some(receiver.id.clone()),
            receiver_name: Some(receiver.name.clone()),
            created_at: now,
        };
        self.private_messages.add(message).await
    }

    /// Conversation list for a user, most recent first
    pub async fn conversations_for(&self, user_id: &str) -> Vec<ConversationSummary> {
        let (users, messages) =
            futures::join!(self.users.list(), self.list_private_messages());
        derive_conversations(&users, &messages, user_id)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Comments on one media item, oldest first
    pub async fn list_comments(&self, media_id: &str) -> AppResult<Vec<Comment>> {
        let mut comments = self.comments(media_id)?.list().await;
        sort_oldest_first(&mut comments);
        Ok(comments)
    }

    pub async fn add_comment(
        &self,
        media_id: &str,
        author: &PublicUser,
        content: &str,
    ) -> AppResult<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("Comment cannot be empty".to_string()));
        }
        if content.chars().count() > MAX_TEXT_LENGTH {
            return Err(AppError::Validation("Comment is too long".to_string()));
        }
        let collection = self.comments(media_id)?;
        let now = Utc::now();

        let comment = Comment {
            id: generate_id("comment", now),
            media_id: media_id.to_string(),
            user_id: author.id.clone(),
            user_name: author.name.clone(),
            user_profile_picture: author.profile_picture.clone(),
            content: content.to_string(),
            created_at: now,
        };
        collection.add(comment).await
    }

    // =========================================================================
    // Likes
    // =========================================================================

    pub async fn list_likes(&self, media_id: &str) -> AppResult<Vec<Like>> {
        let mut likes = self.likes(media_id)?.list().await;
        sort_oldest_first(&mut likes);
        Ok(likes)
    }

    /// Likes on a media item and whether `user_id` is among them
    pub async fn like_summary(
        &self,
        media_id: &str,
        user_id: Option<&str>,
    ) -> AppResult<LikeSummary> {
        let likes = self.list_likes(media_id).await?;
        let user_liked = user_id
            .map(|id| likes.iter().any(|l| l.user_id == id))
            .unwrap_or(false);

        Ok(LikeSummary {
            count: likes.len(),
            likes,
            user_liked,
        })
    }

    /// Like a media item once per user
    ///
    /// Returns the existing like when the user already liked it. The scan
    /// and the write are separate steps, so two concurrent calls can both
    /// write; [`Repository::remove_like`] removes every duplicate.
    pub async fn add_like(&self, media_id: &str, user: &PublicUser) -> AppResult<Like> {
        let collection = self.likes(media_id)?;

        if let Some(existing) = collection
            .list()
            .await
            .into_iter()
            .find(|l| l.user_id == user.id)
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let like = Like {
            id: Like::id_for(&user.id, now),
            media_id: media_id.to_string(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            created_at: now,
        };
        collection.add(like).await
    }

    /// Remove the user's like(s) on a media item; no like is a no-op
    pub async fn remove_like(&self, media_id: &str, user_id: &str) -> AppResult<usize> {
        let removed = self
            .likes(media_id)?
            .delete_where(|l| l.user_id == user_id)
            .await?;
        if removed > 1 {
            info!(
                "Removed {} duplicate likes by {} on {}",
                removed, user_id, media_id
            );
        }
        Ok(removed)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn list_users(&self) -> Vec<User> {
        self.users.list().await
    }

    pub async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        self.users.get(id).await
    }

    /// Look a user up by email, case-insensitively
    pub async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let normalized = keys::normalize_email(email);

        if let Some(data) = self.store.get(&keys::email_index_key(&normalized)).await? {
            let entry: EmailIndexEntry = serde_json::from_slice(&data)?;
            if let Some(user) = self.users.get(&entry.user_id).await? {
                if keys::normalize_email(&user.email) == normalized {
                    return Ok(Some(user));
                }
            }
        }

        // Records written without an index entry
        Ok(self
            .users
            .list()
            .await
            .into_iter()
            .find(|u| keys::normalize_email(&u.email) == normalized))
    }

    /// Create a user with a unique email
    ///
    /// Uniqueness is claimed through an index key written with
    /// `put_if_absent`, so two concurrent signups for one address cannot
    /// both succeed.
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }
        let email = keys::normalize_email(email);

        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: generate_id("user", now),
            name: name.to_string(),
            email: email.clone(),
            password_hash: password_hash.to_string(),
            profile_picture: None,
            created_at: now,
        };

        let index_key = keys::email_index_key(&email);
        let entry = serde_json::to_vec(&EmailIndexEntry {
            user_id: user.id.clone(),
        })?;
        if !self.store.put_if_absent(&index_key, entry).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        match self.users.add(user).await {
            Ok(user) => {
                info!("Created user {}", user.id);
                Ok(user)
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&index_key).await {
                    warn!("Failed to release email index {}: {}", index_key, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Merge a profile patch into a stored user
    pub async fn update_user(&self, id: &str, patch: &UserPatch) -> AppResult<Option<User>> {
        self.users.update(id, |user| patch.apply(user)).await
    }

    /// Users whose name or email contains `query`, case-insensitively
    pub async fn search_users(&self, query: &str, limit: usize) -> Vec<PublicUser> {
        let needle = query.trim().to_lowercase();
        let mut users: Vec<PublicUser> = self
            .users
            .list()
            .await
            .iter()
            .filter(|u| {
                needle.is_empty()
                    || u.name.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            })
            .map(PublicUser::from)
            .collect();

        users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        users.truncate(limit);
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    fn repo() -> Repository {
        Repository::new(Arc::new(MemoryObjectStore::new()))
    }

    async fn member(repo: &Repository, name: &str) -> PublicUser {
        let user = repo
            .create_user(name, &format!("{}@example.com", name), "hash")
            .await
            .unwrap();
        PublicUser::from(&user)
    }

    #[tokio::test]
    async fn test_email_is_unique_case_insensitively() {
        let repo = repo();
        repo.create_user("Ann", "ann@example.com", "h").await.unwrap();

        let err = repo
            .create_user("Ann Again", " ANN@example.com", "h")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(repo.list_users().await.len(), 1);

        let found = repo.find_user_by_email("Ann@Example.com").await.unwrap();
        assert_eq!(found.unwrap().name, "Ann");
    }

    #[tokio::test]
    async fn test_public_and_private_messages_are_separate() {
        let repo = repo();
        let ann = member(&repo, "ann").await;
        let bob = member(&repo, "bob").await;

        repo.add_public_message(&ann, MessageBody::Text { content: "hello all".into() })
            .await
            .unwrap();
        repo.add_private_message(&ann, &bob, MessageBody::Text { content: "hi bob".into() })
            .await
            .unwrap();
        repo.add_private_message(&bob, &ann, MessageBody::Text { content: "hi ann".into() })
            .await
            .unwrap();

        assert_eq!(repo.list_public_messages().await.len(), 1);
        let thread = repo.private_messages_between(&bob.id, &ann.id).await;
        assert_eq!(thread.len(), 2);
        assert!(thread[0].created_at <= thread[1].created_at);
    }

    #[tokio::test]
    async fn test_cannot_message_self() {
        let repo = repo();
        let ann = member(&repo, "ann").await;
        let err = repo
            .add_private_message(&ann, &ann, MessageBody::Text { content: "me".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_user_merges_patch() {
        let repo = repo();
        let ann = member(&repo, "ann").await;

        let patch = UserPatch {
            name: None,
            profile_picture: Some("https://cdn/ann.png".into()),
        };
        let updated = repo.update_user(&ann.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.name, "ann");
        assert_eq!(updated.profile_picture.as_deref(), Some("https://cdn/ann.png"));

        assert!(repo.update_user("user_missing", &patch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_users() {
        let repo = repo();
        member(&repo, "ann").await;
        member(&repo, "bob").await;

        let found = repo.search_users("AN", 10).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ann");
        assert_eq!(repo.search_users("", 1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_comment_rejected() {
        let repo = repo();
        let ann = member(&repo, "ann").await;
        assert!(repo.add_comment("media/a.png", &ann, "   ").await.is_err());
    }
}
