//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use twinkle_shared::UserId;

use crate::changes::ChangeEvent;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{truncate_millis, ProfileUpdate, User};
use crate::rows;

const USER_COLUMNS: &str =
    "id, email, display_name, is_online, last_seen, push_token, photo_url";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user profile. Fails with [`StoreError::Conflict`] if the
    /// id is taken: identifiers are immutable and never reassigned.
    pub fn create_user(&self, user: &User) -> Result<()> {
        insert_user(self.conn(), user)?;
        self.publish(ChangeEvent::User(user.id.clone()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.as_str()],
                row_to_user,
            )
            .map_err(StoreError::from_lookup)
    }

    /// Every user except `excluding`, ordered by display name. Used to
    /// offer "start a new conversation" targets.
    pub fn list_users_except(&self, excluding: &UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE id != ?1
             ORDER BY display_name COLLATE NOCASE ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params![excluding.as_str()], row_to_user)?;
        rows::collect_lenient(rows, "user")
    }

    // ------------------------------------------------------------------
    // Update (field-level merges only)
    // ------------------------------------------------------------------

    /// Set the presence flag and stamp `last_seen` in one write.
    pub fn set_presence(&self, id: &UserId, online: bool, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = ?1, last_seen = ?2 WHERE id = ?3",
            params![online, truncate_millis(at).timestamp_millis(), id.as_str()],
        )?;
        self.finish_user_update(id, affected)
    }

    pub fn set_push_token(&self, id: &UserId, token: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET push_token = ?1 WHERE id = ?2",
            params![token, id.as_str()],
        )?;
        self.finish_user_update(id, affected)
    }

    /// Forget the device token (stale token reported by the push gateway,
    /// or the device signed out).
    ///
    /// When `only_if` is given the token is cleared only if it still holds
    /// that value, so a token refreshed in the meantime survives. Returns
    /// whether a token was removed.
    pub fn clear_push_token(&self, id: &UserId, only_if: Option<&str>) -> Result<bool> {
        let affected = match only_if {
            Some(expected) => self.conn().execute(
                "UPDATE users SET push_token = NULL WHERE id = ?1 AND push_token = ?2",
                params![id.as_str(), expected],
            )?,
            None => self.conn().execute(
                "UPDATE users SET push_token = NULL WHERE id = ?1 AND push_token IS NOT NULL",
                params![id.as_str()],
            )?,
        };
        if affected > 0 {
            self.publish(ChangeEvent::User(id.clone()));
        }
        Ok(affected > 0)
    }

    pub fn update_profile(&self, id: &UserId, update: &ProfileUpdate) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users
             SET display_name = COALESCE(?1, display_name),
                 photo_url    = COALESCE(?2, photo_url)
             WHERE id = ?3",
            params![update.display_name, update.photo_url, id.as_str()],
        )?;
        self.finish_user_update(id, affected)
    }

    fn finish_user_update(&self, id: &UserId, affected: usize) -> Result<()> {
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.publish(ChangeEvent::User(id.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn insert_user(conn: &rusqlite::Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, display_name, is_online, last_seen, push_token, photo_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.as_str(),
            user.email,
            user.display_name,
            user.is_online,
            user.last_seen.timestamp_millis(),
            user.push_token,
            user.photo_url,
        ],
    )
    .map_err(|e| StoreError::from_write(e, "user id already exists"))?;
    Ok(())
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: rows::user_id(row, 0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        is_online: row.get(3)?,
        last_seen: rows::millis(row, 4)?,
        push_token: row.get(5)?,
        photo_url: row.get(6)?,
    })
}
