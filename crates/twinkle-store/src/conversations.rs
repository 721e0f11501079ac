//! Conversation records and per-reader unread counters.
//!
//! The conversation row is the one piece of shared mutable state that both
//! participants write to, so it is only ever touched through merge upserts
//! and counter increments, never rewritten wholesale.

use chrono::Utc;
use rusqlite::params;
use twinkle_shared::{ConversationId, UserId};

use crate::changes::ChangeEvent;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Conversation, Message};
use crate::rows;

const CONVERSATION_SELECT: &str = "
    SELECT c.id, c.participant_a, c.participant_b, c.last_message, c.last_message_ts,
           COALESCE(u.count, 0)
    FROM conversations c
    LEFT JOIN unread_counters u
           ON u.conversation_id = c.id AND u.user_id = ?1";

impl Database {
    /// Apply the conversation-side effects of a freshly appended message.
    ///
    /// Creates the conversation on first use, otherwise merges only the
    /// denormalised last-message fields, and increments the receiver's
    /// unread counter. Both effects commit together or not at all.
    pub fn record_last_message(&self, message: &Message) -> Result<()> {
        let (a, b) = message.conversation_id.participants();

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO conversations
                 (id, participant_a, participant_b, last_message, last_message_ts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 last_message    = excluded.last_message,
                 last_message_ts = excluded.last_message_ts",
            params![
                message.conversation_id.as_str(),
                a.as_str(),
                b.as_str(),
                message.text,
                message.timestamp.timestamp_millis(),
                Utc::now().timestamp_millis(),
            ],
        )?;
        tx.execute(
            "INSERT INTO unread_counters (conversation_id, user_id, count)
             VALUES (?1, ?2, 1)
             ON CONFLICT(conversation_id, user_id) DO UPDATE SET count = count + 1",
            params![
                message.conversation_id.as_str(),
                message.receiver_id.as_str()
            ],
        )?;
        tx.commit()?;

        self.publish(ChangeEvent::Conversation(message.conversation_id.clone()));
        Ok(())
    }

    /// A conversation as seen by `viewer` (whose counter is reported).
    pub fn get_conversation_for(
        &self,
        id: &ConversationId,
        viewer: &UserId,
    ) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!("{CONVERSATION_SELECT} WHERE c.id = ?2"),
                params![viewer.as_str(), id.as_str()],
                row_to_conversation,
            )
            .map_err(StoreError::from_lookup)
    }

    /// Every conversation `user` participates in, most recent first. Ties
    /// on the timestamp are broken by id so the order is stable.
    pub fn list_conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "{CONVERSATION_SELECT}
             WHERE c.participant_a = ?1 OR c.participant_b = ?1
             ORDER BY c.last_message_ts DESC, c.id ASC"
        ))?;

        let rows = stmt.query_map(params![user.as_str()], row_to_conversation)?;
        rows::collect_lenient(rows, "conversation")
    }

    /// Current value of `user`'s stored counter for a conversation.
    pub fn unread_counter(&self, id: &ConversationId, user: &UserId) -> Result<u32> {
        let count: Option<u32> = self
            .conn()
            .query_row(
                "SELECT count FROM unread_counters WHERE conversation_id = ?1 AND user_id = ?2",
                params![id.as_str(), user.as_str()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(count.unwrap_or(0))
    }

    /// Zero `user`'s counter (after their unread messages were flagged).
    pub fn reset_unread(&self, id: &ConversationId, user: &UserId) -> Result<()> {
        self.conn().execute(
            "INSERT INTO unread_counters (conversation_id, user_id, count)
             VALUES (?1, ?2, 0)
             ON CONFLICT(conversation_id, user_id) DO UPDATE SET count = 0",
            params![id.as_str(), user.as_str()],
        )?;
        self.publish(ChangeEvent::Conversation(id.clone()));
        Ok(())
    }

    /// Re-derive `user`'s counter from the message log. Idempotent; any
    /// component may call it to repair drift.
    ///
    /// The conversation record is repaired too: if it is missing, or older
    /// than the newest logged message, its last-message fields are merged
    /// from that message.
    pub fn recompute_unread(&self, id: &ConversationId, user: &UserId) -> Result<u32> {
        let tx = self.conn().unchecked_transaction()?;
        restore_last_message_in(&tx, id)?;
        let count = recompute_in(&tx, id, user)?;
        tx.commit()?;

        self.publish(ChangeEvent::Conversation(id.clone()));
        Ok(count)
    }
}

/// Merge the newest logged message of `id` into its conversation record,
/// creating the record if needed. Never moves the preview backwards.
pub(crate) fn restore_last_message_in(
    conn: &rusqlite::Connection,
    id: &ConversationId,
) -> Result<()> {
    let (a, b) = id.participants();
    conn.execute(
        "INSERT INTO conversations
             (id, participant_a, participant_b, last_message, last_message_ts, created_at)
         SELECT ?1, ?2, ?3, text, timestamp_ms, ?4
         FROM (SELECT text, timestamp_ms FROM messages
               WHERE conversation_id = ?1
               ORDER BY timestamp_ms DESC, seq DESC
               LIMIT 1)
         WHERE true
         ON CONFLICT(id) DO UPDATE SET
             last_message    = excluded.last_message,
             last_message_ts = excluded.last_message_ts
         WHERE excluded.last_message_ts > conversations.last_message_ts",
        params![
            id.as_str(),
            a.as_str(),
            b.as_str(),
            Utc::now().timestamp_millis(),
        ],
    )?;
    Ok(())
}

pub(crate) fn recompute_in(
    conn: &rusqlite::Connection,
    id: &ConversationId,
    user: &UserId,
) -> Result<u32> {
    conn.execute(
        "INSERT INTO unread_counters (conversation_id, user_id, count)
         VALUES (?1, ?2, (SELECT COUNT(*) FROM messages
                          WHERE conversation_id = ?1 AND receiver_id = ?2 AND is_read = 0))
         ON CONFLICT(conversation_id, user_id) DO UPDATE SET count = excluded.count",
        params![id.as_str(), user.as_str()],
    )?;
    let count: u32 = conn.query_row(
        "SELECT count FROM unread_counters WHERE conversation_id = ?1 AND user_id = ?2",
        params![id.as_str(), user.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: rows::conversation_id(row, 0)?,
        participant_ids: [rows::user_id(row, 1)?, rows::user_id(row, 2)?],
        last_message: row.get(3)?,
        last_message_timestamp: rows::millis(row, 4)?,
        unread_count: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use twinkle_shared::MessageId;

    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn send(db: &Database, from: &str, to: &str, text: &str, ms: i64) -> Message {
        let msg = Message::new(MessageId::new(), uid(from), from, uid(to), text, at(ms));
        db.append_message(&msg).unwrap();
        db.record_last_message(&msg).unwrap();
        msg
    }

    #[test]
    fn test_first_message_creates_conversation() {
        let db = Database::open_in_memory().unwrap();
        let msg = send(&db, "alice", "bob", "hi", 100);

        let conv = db.get_conversation_for(&msg.conversation_id, &uid("bob")).unwrap();
        assert_eq!(conv.last_message, "hi");
        assert_eq!(conv.last_message_timestamp, at(100));
        assert_eq!(conv.unread_count, 1);
        assert_eq!(conv.participant_ids, [uid("alice"), uid("bob")]);

        // The sender has nothing unread.
        let mine = db.get_conversation_for(&msg.conversation_id, &uid("alice")).unwrap();
        assert_eq!(mine.unread_count, 0);
    }

    #[test]
    fn test_counters_are_per_receiver() {
        let db = Database::open_in_memory().unwrap();
        send(&db, "alice", "bob", "1", 100);
        send(&db, "alice", "bob", "2", 110);
        let last = send(&db, "bob", "alice", "3", 120);

        let id = &last.conversation_id;
        assert_eq!(db.unread_counter(id, &uid("bob")).unwrap(), 2);
        assert_eq!(db.unread_counter(id, &uid("alice")).unwrap(), 1);
        assert_eq!(db.get_conversation_for(id, &uid("bob")).unwrap().last_message, "3");
    }

    #[test]
    fn test_upsert_does_not_touch_unrelated_fields() {
        let db = Database::open_in_memory().unwrap();
        let first = send(&db, "alice", "bob", "hi", 100);
        let created: i64 = db
            .conn()
            .query_row("SELECT created_at FROM conversations", [], |r| r.get(0))
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        send(&db, "bob", "alice", "yo", 200);

        let (count, created_after): (i64, i64) = db
            .conn()
            .query_row(
                "SELECT COUNT(*), MAX(created_at) FROM conversations WHERE id = ?1",
                params![first.conversation_id.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(created_after, created);
    }

    #[test]
    fn test_list_orders_by_recency() {
        let db = Database::open_in_memory().unwrap();
        send(&db, "alice", "bob", "old", 100);
        send(&db, "carol", "alice", "new", 300);
        send(&db, "alice", "dave", "mid", 200);
        send(&db, "bob", "carol", "not mine", 400);

        let lasts: Vec<_> = db
            .list_conversations_for(&uid("alice"))
            .unwrap()
            .into_iter()
            .map(|c| c.last_message)
            .collect();
        assert_eq!(lasts, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_recompute_is_idempotent_and_repairs_drift() {
        let db = Database::open_in_memory().unwrap();
        let msg = send(&db, "alice", "bob", "hi", 100);
        send(&db, "alice", "bob", "again", 101);
        let id = &msg.conversation_id;
        let bob = uid("bob");

        db.conn()
            .execute("UPDATE unread_counters SET count = 7", [])
            .unwrap();

        assert_eq!(db.recompute_unread(id, &bob).unwrap(), 2);
        assert_eq!(db.recompute_unread(id, &bob).unwrap(), 2);
        assert_eq!(db.unread_counter(id, &bob).unwrap(), 2);
    }

    #[test]
    fn test_recompute_restores_missing_conversation() {
        let db = Database::open_in_memory().unwrap();
        // Appended, but the conversation upsert never ran.
        let log = |text: &str, ms: i64| {
            let m = Message::new(MessageId::new(), uid("alice"), "alice", uid("bob"), text, at(ms));
            db.append_message(&m).unwrap();
            m
        };
        let first = log("one", 100);
        log("two", 200);
        let id = &first.conversation_id;
        assert!(db.get_conversation_for(id, &uid("bob")).is_err());

        assert_eq!(db.recompute_unread(id, &uid("bob")).unwrap(), 2);

        let conv = db.get_conversation_for(id, &uid("bob")).unwrap();
        assert_eq!(conv.last_message, "two");
        assert_eq!(conv.last_message_timestamp, at(200));
        assert_eq!(conv.unread_count, 2);
        assert_eq!(conv.participant_ids, [uid("alice"), uid("bob")]);
        assert_eq!(db.list_conversations_for(&uid("alice")).unwrap().len(), 1);
    }

    #[test]
    fn test_recompute_never_rewinds_preview() {
        let db = Database::open_in_memory().unwrap();
        let msg = send(&db, "alice", "bob", "old", 100);
        db.conn()
            .execute(
                "UPDATE conversations SET last_message = 'kept', last_message_ts = 500",
                [],
            )
            .unwrap();

        db.recompute_unread(&msg.conversation_id, &uid("bob")).unwrap();

        let conv = db.get_conversation_for(&msg.conversation_id, &uid("bob")).unwrap();
        assert_eq!(conv.last_message, "kept");
        assert_eq!(conv.last_message_timestamp, at(500));
    }

    #[test]
    fn test_recompute_without_messages_creates_nothing() {
        let db = Database::open_in_memory().unwrap();
        let id = ConversationId::between(&uid("x"), &uid("y"));
        assert_eq!(db.recompute_unread(&id, &uid("x")).unwrap(), 0);
        assert!(db.get_conversation_for(&id, &uid("x")).is_err());
    }

    #[test]
    fn test_missing_conversation() {
        let db = Database::open_in_memory().unwrap();
        let id = ConversationId::between(&uid("x"), &uid("y"));
        assert!(matches!(
            db.get_conversation_for(&id, &uid("x")),
            Err(StoreError::NotFound)
        ));
        assert_eq!(db.unread_counter(&id, &uid("x")).unwrap(), 0);
    }
}
