//! Message Log: the ordered messages of one conversation, and sending.

use chrono::Utc;
use twinkle_shared::notify::NewMessageNotice;
use twinkle_shared::{ConversationId, MessageId, UserId};
use twinkle_store::{ChangeEvent, Database, Message, StoreError};

use crate::dispatch;
use crate::error::{SendError, SubscriptionError};
use crate::session::{lock_db, Session};
use crate::subscription::{LiveQuery, Subscription};

pub struct MessageLog<'s> {
    session: &'s Session,
}

impl<'s> MessageLog<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Live, timestamp-ordered messages of `conversation`.
    ///
    /// A session holds one message view at a time: subscribing again
    /// cancels the previous view before the new one is returned.
    pub async fn subscribe(
        &self,
        conversation: &ConversationId,
    ) -> Result<Subscription<Message>, SubscriptionError> {
        if !conversation.involves(self.session.user_id()) {
            return Err(SubscriptionError::NotParticipant(conversation.to_string()));
        }

        let query = MessagesQuery {
            conversation: conversation.clone(),
        };
        self.session
            .registry
            .replace_message_view(&self.session.db, query, self.session.buffer)
    }

    /// Send `text` from the session user to `receiver` under a fresh id.
    ///
    /// Empty text is the caller's concern and is not checked here.
    pub async fn send(&self, text: &str, receiver: &UserId) -> Result<Message, SendError> {
        self.send_with_id(MessageId::new(), text, receiver).await
    }

    /// Send with a caller-chosen id. Retrying with the same id after an
    /// ambiguous failure never stores the message twice.
    pub async fn send_with_id(
        &self,
        id: MessageId,
        text: &str,
        receiver: &UserId,
    ) -> Result<Message, SendError> {
        let sender = self.session.user();
        let message = Message::new(
            id,
            sender.id,
            &sender.display_name,
            receiver.clone(),
            text,
            Utc::now(),
        );

        let metadata = {
            let db = lock_db(&self.session.db);
            db.append_message(&message).map_err(|e| match e {
                StoreError::Conflict(_) => SendError::Duplicate(id),
                other => SendError::Append(other),
            })?;
            db.record_last_message(&message)
        };

        // The message is durable from here on, so the receiver is notified
        // whatever happened to the conversation metadata.
        dispatch::spawn_message_created(
            self.session.dispatcher.clone(),
            NewMessageNotice {
                conversation_id: message.conversation_id.clone(),
                message_id: message.id,
            },
        );

        if let Err(source) = metadata {
            tracing::warn!(
                message = %message.id,
                conversation = %message.conversation_id,
                error = %source,
                "message stored without conversation update"
            );
            return Err(SendError::ConversationUpdate {
                message_id: message.id,
                source,
            });
        }

        tracing::debug!(
            message = %message.id,
            conversation = %message.conversation_id,
            "message sent"
        );
        Ok(message)
    }
}

struct MessagesQuery {
    conversation: ConversationId,
}

impl LiveQuery for MessagesQuery {
    type Item = Message;

    fn is_relevant(&self, change: &ChangeEvent) -> bool {
        matches!(change, ChangeEvent::Messages(id) if id == &self.conversation)
    }

    fn load(&mut self, db: &Database) -> twinkle_store::Result<Vec<Message>> {
        db.list_messages(&self.conversation)
    }
}
