//! Conversation Index: the signed-in user's conversations, most recent
//! first, each joined with the counterpart's profile.

use std::collections::HashSet;

use serde::Serialize;
use twinkle_shared::{ConversationId, UserId};
use twinkle_store::{ChangeEvent, Conversation, Database, User};

use crate::error::SubscriptionError;
use crate::session::Session;
use crate::subscription::{LiveQuery, Subscription};

/// A conversation enriched with the other participant's profile.
///
/// `counterpart` is `None` when the profile could not be loaded; the
/// conversation is still listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart: Option<User>,
}

pub struct ConversationIndex<'s> {
    session: &'s Session,
}

impl<'s> ConversationIndex<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Identifier of the conversation between `a` and `b`; symmetric.
    pub fn conversation_id(a: &UserId, b: &UserId) -> ConversationId {
        ConversationId::between(a, b)
    }

    /// Live list of the session user's conversations ordered by last
    /// message, newest first.
    pub async fn subscribe(&self) -> Result<Subscription<ConversationView>, SubscriptionError> {
        let query = ConversationsQuery {
            user: self.session.user_id().clone(),
            counterparts: HashSet::new(),
        };
        self.session
            .registry
            .open(&self.session.db, query, self.session.buffer)
    }

    /// Live list of every other user, for starting a new conversation.
    pub async fn list_other_users(&self) -> Result<Subscription<User>, SubscriptionError> {
        let query = OtherUsersQuery {
            excluding: self.session.user_id().clone(),
        };
        self.session
            .registry
            .open(&self.session.db, query, self.session.buffer)
    }
}

struct ConversationsQuery {
    user: UserId,
    /// Profiles shown in the last snapshot; a change to any of them
    /// re-renders the list.
    counterparts: HashSet<UserId>,
}

impl LiveQuery for ConversationsQuery {
    type Item = ConversationView;

    fn is_relevant(&self, change: &ChangeEvent) -> bool {
        match change {
            ChangeEvent::User(id) => self.counterparts.contains(id),
            other => other.touches_conversations_of(&self.user),
        }
    }

    fn load(&mut self, db: &Database) -> twinkle_store::Result<Vec<ConversationView>> {
        let conversations = db.list_conversations_for(&self.user)?;

        self.counterparts.clear();
        let views = conversations
            .into_iter()
            .map(|conversation| {
                let other = conversation.counterpart(&self.user).clone();
                let counterpart = match db.get_user(&other) {
                    Ok(user) => Some(user),
                    Err(e) => {
                        tracing::warn!(
                            conversation = %conversation.id,
                            counterpart = %other,
                            error = %e,
                            "listing conversation without counterpart profile"
                        );
                        None
                    }
                };
                self.counterparts.insert(other);
                ConversationView {
                    conversation,
                    counterpart,
                }
            })
            .collect();

        Ok(views)
    }
}

struct OtherUsersQuery {
    excluding: UserId,
}

impl LiveQuery for OtherUsersQuery {
    type Item = User;

    fn is_relevant(&self, change: &ChangeEvent) -> bool {
        matches!(change, ChangeEvent::User(id) if id != &self.excluding)
    }

    fn load(&mut self, db: &Database) -> twinkle_store::Result<Vec<User>> {
        db.list_users_except(&self.excluding)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use twinkle_shared::MessageId;
    use twinkle_store::Message;

    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn test_conversation_id_is_symmetric() {
        let (a, b) = (uid("alice"), uid("bob"));
        assert_eq!(
            ConversationIndex::conversation_id(&a, &b),
            ConversationIndex::conversation_id(&b, &a)
        );
    }

    #[test]
    fn test_missing_counterpart_is_still_listed() {
        let db = Database::open_in_memory().unwrap();
        let alice = User::new(uid("alice"), "a@example.com", "Alice");
        db.create_user(&alice).unwrap();

        // "ghost" never got a profile.
        let msg = Message::new(
            MessageId::new(),
            uid("ghost"),
            "Ghost",
            alice.id.clone(),
            "boo",
            DateTime::<Utc>::from_timestamp_millis(100).unwrap(),
        );
        db.append_message(&msg).unwrap();
        db.record_last_message(&msg).unwrap();

        let mut query = ConversationsQuery {
            user: alice.id.clone(),
            counterparts: HashSet::new(),
        };
        let views = query.load(&db).unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].counterpart.is_none());
        assert_eq!(views[0].conversation.unread_count, 1);
    }

    #[test]
    fn test_relevance() {
        let mut query = ConversationsQuery {
            user: uid("alice"),
            counterparts: HashSet::new(),
        };
        query.counterparts.insert(uid("bob"));

        let ab = ConversationId::between(&uid("alice"), &uid("bob"));
        let cd = ConversationId::between(&uid("carol"), &uid("dave"));
        assert!(query.is_relevant(&ChangeEvent::Conversation(ab.clone())));
        assert!(!query.is_relevant(&ChangeEvent::Conversation(cd)));
        assert!(!query.is_relevant(&ChangeEvent::Messages(ab)));
        assert!(query.is_relevant(&ChangeEvent::User(uid("bob"))));
        assert!(!query.is_relevant(&ChangeEvent::User(uid("erin"))));
    }

    #[test]
    fn test_view_serializes_flat() {
        let (a, b) = (uid("alice"), uid("bob"));
        let view = ConversationView {
            conversation: Conversation {
                id: ConversationId::between(&a, &b),
                participant_ids: [a, b.clone()],
                last_message: "hi".into(),
                last_message_timestamp: DateTime::<Utc>::from_timestamp_millis(100).unwrap(),
                unread_count: 2,
            },
            counterpart: Some(User::new(b, "b@example.com", "Bob")),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["lastMessage"], "hi");
        assert_eq!(json["unreadCount"], 2);
        assert_eq!(json["counterpart"]["displayName"], "Bob");
    }
}
