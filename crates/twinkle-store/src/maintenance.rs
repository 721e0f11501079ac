//! Retention and counter repair, run by the notification service.

use chrono::{DateTime, Utc};
use rusqlite::params;
use twinkle_shared::{ConversationId, UserId};

use crate::changes::ChangeEvent;
use crate::conversations::recompute_in;
use crate::database::Database;
use crate::error::Result;
use crate::models::{truncate_millis, PurgeReport};
use crate::rows;

impl Database {
    /// Delete every message older than `cutoff` and re-derive the unread
    /// counters of both participants in each affected conversation.
    ///
    /// Conversation rows themselves are kept, including their last-message
    /// preview.
    pub fn purge_messages_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        let cutoff = truncate_millis(cutoff);
        let tx = self.conn().unchecked_transaction()?;

        let affected: Vec<ConversationId> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT conversation_id FROM messages WHERE timestamp_ms < ?1",
            )?;
            let rows = stmt.query_map(params![cutoff.timestamp_millis()], |row| {
                rows::conversation_id(row, 0)
            })?;
            rows::collect_lenient(rows, "conversation id")?
        };

        // Only conversations whose counters can be recomputed lose messages;
        // rows under an unreadable id stay until someone repairs them.
        let mut deleted = 0;
        let mut recomputed = 0;
        for id in &affected {
            deleted += tx.execute(
                "DELETE FROM messages WHERE conversation_id = ?1 AND timestamp_ms < ?2",
                params![id.as_str(), cutoff.timestamp_millis()],
            )?;

            let (a, b) = id.participants();
            for user in [&a, &b] {
                recompute_in(&tx, id, user)?;
                recomputed += 1;
            }
        }
        tx.commit()?;

        for id in affected {
            self.publish(ChangeEvent::Messages(id.clone()));
            self.publish(ChangeEvent::Conversation(id));
        }

        tracing::info!(%cutoff, deleted, recomputed, "purged expired messages");
        Ok(PurgeReport {
            cutoff,
            deleted_messages: deleted,
            recomputed_counters: recomputed,
        })
    }

    /// Re-derive every stored counter from the message log. Returns the
    /// number of counters written.
    pub fn recompute_all_unread(&self) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;

        let pairs: Vec<(ConversationId, UserId)> = {
            let mut stmt = tx.prepare(
                "SELECT conversation_id, user_id FROM unread_counters
                 UNION
                 SELECT DISTINCT conversation_id, receiver_id FROM messages WHERE is_read = 0",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((rows::conversation_id(row, 0)?, rows::user_id(row, 1)?))
            })?;
            rows::collect_lenient(rows, "unread counter")?
        };

        for (id, user) in &pairs {
            recompute_in(&tx, id, user)?;
        }
        tx.commit()?;

        let mut seen = std::collections::BTreeSet::new();
        for (id, _) in &pairs {
            if seen.insert(id.clone()) {
                self.publish(ChangeEvent::Conversation(id.clone()));
            }
        }
        Ok(pairs.len())
    }
}
