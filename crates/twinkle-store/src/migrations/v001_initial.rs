//! v001 -- Initial schema creation.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (profiles; never deleted by clients)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,
    email        TEXT NOT NULL,
    display_name TEXT NOT NULL,
    is_online    INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    last_seen    INTEGER NOT NULL,             -- unix millis
    push_token   TEXT,
    photo_url    TEXT
);

-- ----------------------------------------------------------------
-- Accounts and sessions (email/password identity provider)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS accounts (
    user_id       TEXT PRIMARY KEY NOT NULL,
    email         TEXT NOT NULL UNIQUE,        -- trimmed, lower-case
    password_salt TEXT NOT NULL,               -- hex
    password_hash TEXT NOT NULL,               -- hex
    created_at    INTEGER NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS sessions (
    token      TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    revoked_at INTEGER,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

-- ----------------------------------------------------------------
-- Conversations (id = sorted participant ids joined by '_')
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY NOT NULL,
    participant_a   TEXT NOT NULL,
    participant_b   TEXT NOT NULL,
    last_message    TEXT NOT NULL,
    last_message_ts INTEGER NOT NULL,          -- unix millis
    created_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_a ON conversations(participant_a, last_message_ts DESC);
CREATE INDEX IF NOT EXISTS idx_conversations_b ON conversations(participant_b, last_message_ts DESC);

-- One counter per (conversation, reader).
CREATE TABLE IF NOT EXISTS unread_counters (
    conversation_id TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    count           INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),

    PRIMARY KEY (conversation_id, user_id)
);

-- ----------------------------------------------------------------
-- Messages (append-only; only is_read changes)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order, tie-breaker
    id              TEXT NOT NULL UNIQUE,               -- UUID v4
    conversation_id TEXT NOT NULL,
    sender_id       TEXT NOT NULL,
    sender_name     TEXT NOT NULL,
    receiver_id     TEXT NOT NULL,
    text            TEXT NOT NULL,
    timestamp_ms    INTEGER NOT NULL,
    is_read         INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, timestamp_ms, seq);

CREATE INDEX IF NOT EXISTS idx_messages_unread
    ON messages(conversation_id, receiver_id, is_read);

CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(timestamp_ms);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
