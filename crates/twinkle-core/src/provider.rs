//! Email/password identity provider.

use async_trait::async_trait;
use chrono::Utc;
use twinkle_shared::constants::MIN_PASSWORD_LEN;
use twinkle_shared::credentials::{generate_session_token, PasswordHash};
use twinkle_shared::UserId;
use twinkle_store::{StoreError, User};

use crate::error::{AuthError, AuthErrorReason};
use crate::session::{lock_db, SharedDatabase};

/// Credential exchange returning a stable user id and an opaque session
/// token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a new account and its profile. The profile starts online.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AuthError>;

    async fn verify_password(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    async fn issue_session(&self, user: &UserId) -> Result<String, AuthError>;

    /// The user owning `token`; `SessionExpired` if it was revoked or never
    /// existed.
    async fn resolve_session(&self, token: &str) -> Result<UserId, AuthError>;

    async fn revoke_session(&self, token: &str) -> Result<(), AuthError>;
}

/// Provider backed by the local document store.
pub struct LocalIdentityProvider {
    db: SharedDatabase,
}

impl LocalIdentityProvider {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AuthError> {
        validate_email(email)?;
        validate_password(password)?;

        let user = User::new(UserId::generate(), email.trim(), display_name.trim());
        let hash = PasswordHash::derive(password);

        lock_db(&self.db)
            .create_account(&user, &hash)
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::new(
                    AuthErrorReason::DuplicateAccount,
                    "an account with this email already exists",
                ),
                other => AuthError::unavailable(other),
            })?;

        tracing::info!(user = %user.id.short(), "account registered");
        Ok(user)
    }

    async fn verify_password(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let invalid = || {
            AuthError::new(
                AuthErrorReason::InvalidCredentials,
                "email or password is incorrect",
            )
        };

        let account = match lock_db(&self.db).find_account_by_email(email) {
            Ok(account) => account,
            Err(StoreError::NotFound) => return Err(invalid()),
            Err(e) => return Err(AuthError::unavailable(e)),
        };

        if !account.password.verify(password) {
            return Err(invalid());
        }
        Ok(account.user_id)
    }

    async fn issue_session(&self, user: &UserId) -> Result<String, AuthError> {
        let token = generate_session_token();
        lock_db(&self.db)
            .create_session(user, &token, Utc::now())
            .map_err(AuthError::unavailable)?;
        Ok(token)
    }

    async fn resolve_session(&self, token: &str) -> Result<UserId, AuthError> {
        match lock_db(&self.db).resolve_session(token) {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(AuthError::new(
                AuthErrorReason::SessionExpired,
                "session is no longer valid",
            )),
            Err(e) => Err(AuthError::unavailable(e)),
        }
    }

    async fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        let revoked = lock_db(&self.db)
            .revoke_session(token, Utc::now())
            .map_err(AuthError::unavailable)?;
        if !revoked {
            tracing::debug!("session already revoked");
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let invalid = || AuthError::new(AuthErrorReason::InvalidEmail, "email address is badly formatted");

    let (local, domain) = email.trim().split_once('@').ok_or_else(invalid)?;
    let domain_ok = domain
        .split_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());

    if local.is_empty() || !domain_ok || domain.contains('@') || email.trim().contains(' ') {
        return Err(invalid());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::new(
            AuthErrorReason::WeakPassword,
            format!("password should be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use twinkle_store::Database;

    use super::*;

    fn provider() -> LocalIdentityProvider {
        LocalIdentityProvider::new(Arc::new(Mutex::new(Database::open_in_memory().unwrap())))
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email(" alice@mail.example.org ").is_ok());
        for bad in ["", "alice", "@example.com", "alice@", "alice@example", "a@b@c.d", "a b@c.d"] {
            let err = validate_email(bad).unwrap_err();
            assert!(err.is(AuthErrorReason::InvalidEmail), "{bad:?} accepted");
        }
    }

    #[tokio::test]
    async fn test_sign_up_then_verify() {
        let p = provider();
        let user = p
            .create_account("Alice@Example.com", "hunter22", " Alice ")
            .await
            .unwrap();
        assert_eq!(user.display_name, "Alice");
        assert!(user.is_online);

        let id = p.verify_password("alice@example.com", "hunter22").await.unwrap();
        assert_eq!(id, user.id);

        let err = p.verify_password("alice@example.com", "wrong-pw").await.unwrap_err();
        assert!(err.is(AuthErrorReason::InvalidCredentials));
        let err = p.verify_password("nobody@example.com", "hunter22").await.unwrap_err();
        assert!(err.is(AuthErrorReason::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_duplicate_and_weak() {
        let p = provider();
        p.create_account("a@example.com", "hunter22", "A").await.unwrap();

        let err = p.create_account("A@example.com", "hunter22", "B").await.unwrap_err();
        assert!(err.is(AuthErrorReason::DuplicateAccount));

        let err = p.create_account("b@example.com", "12345", "B").await.unwrap_err();
        assert!(err.is(AuthErrorReason::WeakPassword));
    }

    #[tokio::test]
    async fn test_session_tokens() {
        let p = provider();
        let user = p.create_account("a@example.com", "hunter22", "A").await.unwrap();

        let token = p.issue_session(&user.id).await.unwrap();
        assert_eq!(p.resolve_session(&token).await.unwrap(), user.id);

        p.revoke_session(&token).await.unwrap();
        let err = p.resolve_session(&token).await.unwrap_err();
        assert!(err.is(AuthErrorReason::SessionExpired));

        // Revoking twice is harmless.
        p.revoke_session(&token).await.unwrap();
    }
}
