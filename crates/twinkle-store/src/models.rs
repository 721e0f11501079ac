//! Domain model structs persisted in the document store.
//!
//! Every struct derives `Serialize` and `Deserialize` with the camelCase
//! field names the mobile clients already use, so records can be handed
//! straight to a UI layer or over HTTP.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twinkle_shared::{ConversationId, MessageId, UserId};

/// Drop sub-millisecond precision so that values survive a round trip
/// through the integer millisecond columns unchanged.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile. The identifier never changes once created and users
/// are never deleted by clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    /// Presence flag, true while a session is signed in.
    pub is_online: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
    /// Device push token, cleared when the gateway reports it stale.
    #[serde(rename = "fcmToken", default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    /// Profile photo reference. Older clients wrote `profileImageURL`.
    #[serde(
        rename = "photoURL",
        alias = "profileImageURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_url: Option<String>,
}

impl User {
    /// A freshly registered, online user.
    pub fn new(id: UserId, email: &str, display_name: &str) -> Self {
        Self {
            id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            is_online: true,
            last_seen: truncate_millis(Utc::now()),
            push_token: None,
            photo_url: None,
        }
    }
}

/// Merge-only profile edit: `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", alias = "profileImageURL")]
    pub photo_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A one-to-one conversation as seen by one of its participants.
///
/// `unread_count` is the viewer's counter: the number of messages in the
/// conversation addressed to the viewer that are still unread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    /// Both participants, in canonical (sorted) order.
    pub participant_ids: [UserId; 2],
    pub last_message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_message_timestamp: DateTime<Utc>,
    pub unread_count: u32,
}

impl Conversation {
    /// The participant that is not `viewer`.
    pub fn counterpart(&self, viewer: &UserId) -> &UserId {
        if &self.participant_ids[0] == viewer {
            &self.participant_ids[1]
        } else {
            &self.participant_ids[0]
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. Append-only: after creation only `is_read` may
/// change, and only from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Sender display name, captured at send time.
    pub sender_name: String,
    pub receiver_id: UserId,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    /// Build an unread message; the conversation id is derived from the
    /// participant pair.
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        sender_name: &str,
        receiver_id: UserId,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            conversation_id: ConversationId::between(&sender_id, &receiver_id),
            sender_id,
            sender_name: sender_name.to_string(),
            receiver_id,
            text: text.to_string(),
            timestamp: truncate_millis(timestamp),
            is_read: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts and sessions
// ---------------------------------------------------------------------------

/// Credentials row backing email/password sign-in.
#[derive(Debug, Clone)]
pub struct Account {
    pub user_id: UserId,
    /// Normalised (trimmed, lower-case) email address.
    pub email: String,
    pub password: twinkle_shared::credentials::PasswordHash,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

/// Outcome of a retention purge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub cutoff: DateTime<Utc>,
    pub deleted_messages: usize,
    pub recomputed_counters: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_accepts_legacy_photo_field() {
        let json = serde_json::json!({
            "id": "alice",
            "email": "alice@example.com",
            "displayName": "Alice",
            "isOnline": false,
            "lastSeen": 1_700_000_000_000i64,
            "profileImageURL": "https://img/alice.png",
        });
        let user: User = serde_json::from_value(json).unwrap();
        assert_eq!(user.photo_url.as_deref(), Some("https://img/alice.png"));
        assert!(user.push_token.is_none());

        let out = serde_json::to_value(&user).unwrap();
        assert_eq!(out["photoURL"], "https://img/alice.png");
        assert!(out.get("profileImageURL").is_none());
    }

    #[test]
    fn test_message_derives_conversation() {
        let a = UserId::parse("zoe").unwrap();
        let b = UserId::parse("adam").unwrap();
        let msg = Message::new(MessageId::new(), a, "Zoe", b, "hey", Utc::now());
        assert_eq!(msg.conversation_id.as_str(), "adam_zoe");
        assert!(!msg.is_read);
        assert_eq!(msg.timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_counterpart() {
        let a = UserId::parse("a").unwrap();
        let b = UserId::parse("b").unwrap();
        let conv = Conversation {
            id: ConversationId::between(&a, &b),
            participant_ids: [a.clone(), b.clone()],
            last_message: String::new(),
            last_message_timestamp: Utc::now(),
            unread_count: 0,
        };
        assert_eq!(conv.counterpart(&a), &b);
        assert_eq!(conv.counterpart(&b), &a);
    }
}
