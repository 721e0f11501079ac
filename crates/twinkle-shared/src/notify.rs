use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{PUSH_TTL_SECS, PUSH_TYPE_NEW_MESSAGE};
use crate::types::{ConversationId, MessageId, UserId};

/// Sent by a client after a message has been durably appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageNotice {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

/// Sent after a reader flipped messages to read, asking the service to
/// re-derive the reader's unread counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotice {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

/// What the notification service did with a [`NewMessageNotice`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent,
    Skipped { reason: SkipReason },
    /// The gateway refused the token and it was removed from the user record
    TokenCleared,
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MessageNotFound,
    ReceiverNotFound,
    NoPushToken,
    ReceiverOnline,
}

/// A single push delivered through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub ttl_secs: u64,
}

impl PushMessage {
    /// Build the notification announcing a new chat message.
    pub fn new_message(
        token: &str,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        sender_id: &UserId,
        sender_name: &str,
        text: &str,
    ) -> Self {
        let mut data = BTreeMap::new();
        data.insert("conversationId".to_string(), conversation_id.to_string());
        data.insert("messageId".to_string(), message_id.to_string());
        data.insert("senderId".to_string(), sender_id.to_string());
        data.insert("senderName".to_string(), sender_name.to_string());
        data.insert("type".to_string(), PUSH_TYPE_NEW_MESSAGE.to_string());

        Self {
            token: token.to_string(),
            title: sender_name.to_string(),
            body: text.to_string(),
            data,
            ttl_secs: PUSH_TTL_SECS,
        }
    }
}
