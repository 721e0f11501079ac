//! Change feed announcing committed writes.
//!
//! Live views subscribe to the feed and re-query whatever they display
//! when a relevant event arrives. Events carry identifiers only, never
//! data, so a lagging receiver can always recover by re-reading the store.

use twinkle_shared::{ConversationId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A user profile, presence flag or push token changed.
    User(UserId),
    /// Denormalised fields or an unread counter of a conversation changed.
    Conversation(ConversationId),
    /// A message was appended to, flagged in, or purged from a conversation.
    Messages(ConversationId),
}

impl ChangeEvent {
    /// Whether the event concerns a conversation `user` participates in.
    pub fn touches_conversations_of(&self, user: &UserId) -> bool {
        match self {
            ChangeEvent::Conversation(id) => id.involves(user),
            _ => false,
        }
    }
}
