//! The per-conversation message log.
//!
//! Messages are append-only. The only mutation after insert is flipping
//! `is_read` from false to true, which happens in whole-conversation
//! batches.

use rusqlite::params;
use twinkle_shared::{ConversationId, MessageId, UserId};

use crate::changes::ChangeEvent;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::rows;

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, sender_name, receiver_id, text, timestamp_ms, is_read";

impl Database {
    /// Append a message. A message id that already exists yields
    /// [`StoreError::Conflict`] and the log is left unchanged.
    pub fn append_message(&self, message: &Message) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO messages
                     (id, conversation_id, sender_id, sender_name, receiver_id, text,
                      timestamp_ms, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    message.id.to_string(),
                    message.conversation_id.as_str(),
                    message.sender_id.as_str(),
                    message.sender_name,
                    message.receiver_id.as_str(),
                    message.text,
                    message.timestamp.timestamp_millis(),
                    message.is_read,
                ],
            )
            .map_err(|e| StoreError::from_write(e, "message id already exists"))?;

        tracing::trace!(id = %message.id, conversation = %message.conversation_id, "message appended");
        self.publish(ChangeEvent::Messages(message.conversation_id.clone()));
        Ok(())
    }

    pub fn get_message(&self, id: &MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(StoreError::from_lookup)
    }

    /// All messages of a conversation in display order: ascending
    /// timestamp, then insertion order for equal timestamps.
    pub fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp_ms ASC, seq ASC"
        ))?;

        let rows = stmt.query_map(params![conversation.as_str()], row_to_message)?;
        rows::collect_lenient(rows, "message")
    }

    /// Flag every unread message addressed to `reader` in one atomic
    /// statement. Returns how many messages changed state.
    pub fn mark_read_batch(&self, conversation: &ConversationId, reader: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![conversation.as_str(), reader.as_str()],
        )?;
        if affected > 0 {
            self.publish(ChangeEvent::Messages(conversation.clone()));
        }
        Ok(affected)
    }

    /// Number of unread messages addressed to `reader`, counted from the
    /// log itself rather than the stored counter.
    pub fn count_unread(&self, conversation: &ConversationId, reader: &UserId) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![conversation.as_str(), reader.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: rows::message_id(row, 0)?,
        conversation_id: rows::conversation_id(row, 1)?,
        sender_id: rows::user_id(row, 2)?,
        sender_name: row.get(3)?,
        receiver_id: rows::user_id(row, 4)?,
        text: row.get(5)?,
        timestamp: rows::millis(row, 6)?,
        is_read: row.get(7)?,
    })
}
