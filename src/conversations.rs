/// Conversation list derivation
///
/// There is no per-conversation index: the list is rebuilt from every user
/// and every private message on each request, O(total private messages).
use crate::models::{ConversationSummary, Message, PublicUser, User};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Counterparts `user_id` has exchanged private messages with, most recent
/// conversation first
///
/// Counterparts missing from `users` are dropped. Equal timestamps are
/// ordered by user id so the output is stable.
pub fn derive_conversations(
    users: &[User],
    messages: &[Message],
    user_id: &str,
) -> Vec<ConversationSummary> {
    let users_by_id: HashMap<&str, &User> = users.iter().map(|u| (u.id.as_str(), u)).collect();

    let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for message in messages {
        let Some(counterpart) = message.counterpart_of(user_id) else {
            continue;
        };
        if counterpart == user_id {
            continue;
        }

        latest
            .entry(counterpart)
            .and_modify(|at| {
                if message.created_at > *at {
                    *at = message.created_at;
                }
            })
            .or_insert(message.created_at);
    }

    let mut conversations: Vec<ConversationSummary> = latest
        .into_iter()
        .filter_map(|(id, last_message_at)| {
            users_by_id.get(id).map(|user| ConversationSummary {
                user: PublicUser::from(*user),
                last_message_at,
            })
        })
        .collect();

    conversations.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.user.id.cmp(&b.user.id))
    });
    conversations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageBody;
    use chrono::TimeZone;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: id.to_uppercase(),
            email: format!("{}@example.com", id),
            password_hash: "hash".to_string(),
            profile_picture: None,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    fn dm(from: &str, to: &str, secs: i64) -> Message {
        Message {
            id: format!("msg_{}_{}_{}", from, to, secs),
            body: MessageBody::Text {
                content: "hi".to_string(),
            },
            sender_id: from.to_string(),
            sender_name: from.to_uppercase(),
            sender_profile_picture: None,
            receiver_id: Some(to.to_string()),
            receiver_name: Some(to.to_uppercase()),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_most_recent_conversation_first() {
        let users = vec![user("a"), user("b"), user("c")];
        let messages = vec![dm("a", "b", 1), dm("b", "a", 2), dm("a", "c", 3)];

        let result = derive_conversations(&users, &messages, "a");
        let ids: Vec<&str> = result.iter().map(|c| c.user.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(result[1].last_message_at, Utc.timestamp_opt(2, 0).unwrap());
    }

    #[test]
    fn test_older_message_does_not_lower_latest() {
        let users = vec![user("a"), user("b")];
        let messages = vec![dm("a", "b", 10), dm("b", "a", 4)];

        let result = derive_conversations(&users, &messages, "a");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].last_message_at, Utc.timestamp_opt(10, 0).unwrap());
    }

    #[test]
    fn test_unknown_counterparts_and_other_threads_ignored() {
        let users = vec![user("a"), user("b")];
        let messages = vec![dm("a", "ghost", 5), dm("b", "c", 6), dm("b", "a", 1)];

        let result = derive_conversations(&users, &messages, "a");
        let ids: Vec<&str> = result.iter().map(|c| c.user.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_no_messages() {
        let users = vec![user("a")];
        assert!(derive_conversations(&users, &[], "a").is_empty());
    }
}
