//! Email/password accounts and opaque session tokens.

use chrono::{DateTime, Utc};
use rusqlite::params;
use twinkle_shared::credentials::PasswordHash;
use twinkle_shared::UserId;

use crate::changes::ChangeEvent;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Account, User};
use crate::rows;
use crate::users::insert_user;

/// Canonical form used for the unique email index.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Database {
    /// Register credentials together with the user's profile.
    ///
    /// Both rows are written in one transaction; an email that is already
    /// registered yields [`StoreError::Conflict`] and leaves nothing behind.
    pub fn create_account(&self, user: &User, password: &PasswordHash) -> Result<Account> {
        let email = normalize_email(&user.email);
        let created_at = Utc::now();

        let tx = self.conn().unchecked_transaction()?;
        insert_user(&tx, user)?;
        tx.execute(
            "INSERT INTO accounts (user_id, email, password_salt, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.as_str(),
                email,
                password.salt_hex(),
                password.digest_hex(),
                created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| StoreError::from_write(e, "email already registered"))?;
        tx.commit()?;

        tracing::debug!(user = %user.id, "account created");
        self.publish(ChangeEvent::User(user.id.clone()));

        Ok(Account {
            user_id: user.id.clone(),
            email,
            password: password.clone(),
            created_at,
        })
    }

    pub fn find_account_by_email(&self, email: &str) -> Result<Account> {
        self.conn()
            .query_row(
                "SELECT user_id, email, password_salt, password_hash, created_at
                 FROM accounts WHERE email = ?1",
                params![normalize_email(email)],
                row_to_account,
            )
            .map_err(StoreError::from_lookup)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn create_session(&self, user_id: &UserId, token: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![token, user_id.as_str(), at.timestamp_millis()],
            )
            .map_err(|e| StoreError::from_write(e, "session token collision"))?;
        Ok(())
    }

    /// The user owning a live (non-revoked) session token.
    pub fn resolve_session(&self, token: &str) -> Result<UserId> {
        self.conn()
            .query_row(
                "SELECT user_id FROM sessions WHERE token = ?1 AND revoked_at IS NULL",
                params![token],
                |row| rows::user_id(row, 0),
            )
            .map_err(StoreError::from_lookup)
    }

    /// Revoke a session. Returns `false` if it was unknown or already revoked.
    pub fn revoke_session(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sessions SET revoked_at = ?1 WHERE token = ?2 AND revoked_at IS NULL",
            params![at.timestamp_millis(), token],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let salt_hex: String = row.get(2)?;
    let hash_hex: String = row.get(3)?;
    let password = PasswordHash::from_hex(&salt_hex, &hash_hex).map_err(|e| rows::bad_column(3, e))?;

    Ok(Account {
        user_id: rows::user_id(row, 0)?,
        email: row.get(1)?,
        password,
        created_at: rows::millis(row, 4)?,
    })
}
