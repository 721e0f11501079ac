//! Column decoding helpers shared by the CRUD modules.

use chrono::{DateTime, Utc};
use twinkle_shared::{ConversationId, MessageId, UserId};

use crate::error::Result;

/// Wrap a decode failure for column `idx` the way rusqlite reports them.
pub(crate) fn bad_column<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

pub(crate) fn user_id(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<UserId> {
    let raw: String = row.get(idx)?;
    UserId::parse(&raw).map_err(|e| bad_column(idx, e))
}

pub(crate) fn conversation_id(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<ConversationId> {
    let raw: String = row.get(idx)?;
    ConversationId::parse(&raw).map_err(|e| bad_column(idx, e))
}

pub(crate) fn message_id(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<MessageId> {
    let raw: String = row.get(idx)?;
    MessageId::parse(&raw).map_err(|e| bad_column(idx, e))
}

pub(crate) fn millis(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

/// Drain a row iterator, logging and skipping rows that fail to decode.
///
/// A single malformed record must never hide the rest of a listing; real
/// database errors still abort.
pub(crate) fn collect_lenient<T, I>(rows: I, kind: &'static str) -> Result<Vec<T>>
where
    I: Iterator<Item = rusqlite::Result<T>>,
{
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(item) => out.push(item),
            Err(
                e @ (rusqlite::Error::FromSqlConversionFailure(..)
                | rusqlite::Error::IntegralValueOutOfRange(..)
                | rusqlite::Error::InvalidColumnType(..)),
            ) => {
                tracing::warn!(kind, error = %e, "skipping malformed record");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}
