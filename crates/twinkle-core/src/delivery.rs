//! Delivery Tracker: read state and unread counters.
//!
//! Messages go Unread -> Read through [`DeliveryTracker::mark_read`] only;
//! there is no way back.

use twinkle_shared::notify::ReadNotice;
use twinkle_shared::ConversationId;

use crate::dispatch;
use crate::error::SyncError;
use crate::session::{lock_db, Session};

pub struct DeliveryTracker<'s> {
    session: &'s Session,
}

impl<'s> DeliveryTracker<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Flag every message addressed to the session user as read, then
    /// zero their counter. Returns how many messages changed state.
    ///
    /// The flag batch is all-or-nothing and always completes before the
    /// counter is touched, so nobody observes zero unread alongside
    /// unread messages.
    pub async fn mark_read(&self, conversation: &ConversationId) -> Result<usize, SyncError> {
        let reader = self.session.user_id();

        let flipped = {
            let db = lock_db(&self.session.db);
            let flipped = db
                .mark_read_batch(conversation, reader)
                .map_err(SyncError::Batch)?;
            db.reset_unread(conversation, reader)
                .map_err(|source| SyncError::CounterReset { flipped, source })?;
            flipped
        };

        if flipped > 0 {
            tracing::debug!(conversation = %conversation, flipped, "marked messages read");
            dispatch::spawn_messages_read(
                self.session.dispatcher.clone(),
                ReadNotice {
                    conversation_id: conversation.clone(),
                    user_id: reader.clone(),
                },
            );
        }
        Ok(flipped)
    }

    /// Re-derive the session user's counter from the message log.
    pub async fn recompute(&self, conversation: &ConversationId) -> Result<u32, SyncError> {
        lock_db(&self.session.db)
            .recompute_unread(conversation, self.session.user_id())
            .map_err(SyncError::Recompute)
    }

    /// The stored counter, as shown in the conversation list.
    pub fn unread_count(&self, conversation: &ConversationId) -> Result<u32, SyncError> {
        lock_db(&self.session.db)
            .unread_counter(conversation, self.session.user_id())
            .map_err(SyncError::Counter)
    }
}
