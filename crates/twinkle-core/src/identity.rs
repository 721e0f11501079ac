//! Identity Store: sign-in, sign-up, restore and sign-out.
//!
//! This is the only entry point that exists before authentication. Each
//! successful sign-in yields a [`Session`]; all other components hang off
//! that session.

use std::sync::{Arc, Mutex, PoisonError};

use twinkle_shared::UserId;
use twinkle_store::{Database, User};

use crate::config::ClientConfig;
use crate::dispatch::{HttpDispatcher, NoopDispatcher, NotificationDispatcher};
use crate::error::{AuthError, AuthErrorReason, OpenError};
use crate::preferences::PreferenceStore;
use crate::provider::{IdentityProvider, LocalIdentityProvider};
use crate::session::{
    lock_db, lock_prefs, Session, SharedDatabase, SharedPreferences, SubscriptionRegistry,
};

/// The session currently signed in on this device.
struct ActiveSession {
    user_id: UserId,
    token: String,
    registry: Arc<SubscriptionRegistry>,
}

pub struct IdentityStore {
    db: SharedDatabase,
    provider: Arc<dyn IdentityProvider>,
    preferences: SharedPreferences,
    dispatcher: Arc<dyn NotificationDispatcher>,
    subscription_buffer: usize,
    active: Mutex<Option<ActiveSession>>,
}

impl IdentityStore {
    pub fn new(
        db: SharedDatabase,
        provider: Arc<dyn IdentityProvider>,
        preferences: PreferenceStore,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            provider,
            preferences: Arc::new(Mutex::new(preferences)),
            dispatcher,
            subscription_buffer: twinkle_shared::constants::DEFAULT_SUBSCRIPTION_BUFFER,
            active: Mutex::new(None),
        }
    }

    /// Assemble the core from configuration: open the store and the
    /// preference file, and pick a dispatcher.
    pub fn open(config: &ClientConfig) -> Result<Self, OpenError> {
        let db = match config.db_path {
            Some(ref path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        let db = Arc::new(Mutex::new(db));

        let preferences = PreferenceStore::load(&config.preferences_path)?;

        let dispatcher: Arc<dyn NotificationDispatcher> = match config.notifier_url {
            Some(ref url) => Arc::new(HttpDispatcher::new(url, config.notifier_token.clone())?),
            None => {
                tracing::info!("no notifier configured, push dispatch disabled");
                Arc::new(NoopDispatcher)
            }
        };

        let provider = Arc::new(LocalIdentityProvider::new(db.clone()));
        Ok(Self::new(db, provider, preferences, dispatcher)
            .with_subscription_buffer(config.subscription_buffer))
    }

    pub fn with_subscription_buffer(mut self, buffer: usize) -> Self {
        self.subscription_buffer = buffer.max(1);
        self
    }

    pub fn database(&self) -> SharedDatabase {
        self.db.clone()
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Session, AuthError> {
        let user = self
            .provider
            .create_account(email, password, display_name)
            .await?;
        self.start_session(user.id).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user_id = self.provider.verify_password(email, password).await?;
        self.start_session(user_id).await
    }

    /// Resume the session remembered in local preferences.
    ///
    /// Returns `Ok(None)` when nobody was signed in. A token that no longer
    /// resolves clears local state and fails with `SessionExpired`.
    pub async fn restore(&self) -> Result<Option<Session>, AuthError> {
        let token = {
            let prefs = lock_prefs(&self.preferences);
            match prefs.get().session_token.clone() {
                Some(token) if prefs.get().logged_in => token,
                _ => return Ok(None),
            }
        };

        let user_id = match self.provider.resolve_session(&token).await {
            Ok(user_id) => user_id,
            Err(e) if e.is(AuthErrorReason::SessionExpired) => {
                tracing::info!("stored session expired, clearing local state");
                lock_prefs(&self.preferences)
                    .clear_session()
                    .map_err(AuthError::unavailable)?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let session = self.open_session(&user_id, token).await?;
        tracing::info!(user = %user_id.short(), "session restored");
        Ok(Some(session))
    }

    /// End `session`: every live view is torn down first, then presence
    /// goes false, the token is revoked and local state is cleared.
    ///
    /// Signing out a session that was already replaced on this device
    /// leaves its successor alone: the successor's preferences stay, and
    /// presence is kept if the successor is the same user.
    ///
    /// Every step runs; the first failure is returned.
    pub async fn sign_out(&self, session: Session) -> Result<(), AuthError> {
        let cancelled = session.registry.close();

        let (was_active, same_user_active) = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.as_ref().is_some_and(|a| a.token == session.token()) {
                *active = None;
                (true, false)
            } else {
                let same_user = active
                    .as_ref()
                    .is_some_and(|a| &a.user_id == session.user_id());
                (false, same_user)
            }
        };

        let mut first_error: Option<AuthError> = None;

        if !same_user_active {
            if let Err(e) = session.set_presence(false) {
                tracing::warn!(error = %e, "failed to clear presence on sign-out");
                first_error.get_or_insert(AuthError::unavailable(e));
            }
        }

        if let Err(e) = self.provider.revoke_session(session.token()).await {
            tracing::warn!(error = %e, "failed to revoke session");
            first_error.get_or_insert(e);
        }

        if was_active {
            let cleared = lock_prefs(&self.preferences).clear_session();
            if let Err(e) = cleared {
                tracing::warn!(error = %e, "failed to clear preferences");
                first_error.get_or_insert(AuthError::unavailable(e));
            }
        }

        tracing::info!(
            user = %session.user_id().short(),
            cancelled,
            was_active,
            "signed out"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Profile of the signed-in user, re-read from the store, or `None`
    /// when signed out.
    pub fn current_user(&self) -> Option<User> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.user_id.clone())?;

        match lock_db(&self.db).get_user(&active) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(user = %active, error = %e, "current user profile unavailable");
                None
            }
        }
    }

    /// Issue a token, persist it locally and open the session.
    async fn start_session(&self, user_id: UserId) -> Result<Session, AuthError> {
        let token = self.provider.issue_session(&user_id).await?;
        let session = self.open_session(&user_id, token).await?;
        tracing::info!(user = %user_id.short(), "signed in");
        Ok(session)
    }

    /// Mark the user online, remember the session and build its context.
    /// A session already signed in on this device is retired once the new
    /// one is in place.
    async fn open_session(&self, user_id: &UserId, token: String) -> Result<Session, AuthError> {
        let user = {
            let db = lock_db(&self.db);
            db.set_presence(user_id, true, chrono::Utc::now())
                .map_err(AuthError::unavailable)?;
            db.get_user(user_id).map_err(AuthError::unavailable)?
        };

        lock_prefs(&self.preferences)
            .save_session(&user, &token)
            .map_err(AuthError::unavailable)?;

        let session = Session::new(
            user,
            token,
            self.db.clone(),
            self.dispatcher.clone(),
            self.preferences.clone(),
            self.subscription_buffer,
        );

        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveSession {
                user_id: user_id.clone(),
                token: session.token().to_string(),
                registry: session.registry.clone(),
            });
        if let Some(previous) = previous {
            self.retire(previous, &session).await;
        }

        Ok(session)
    }

    /// Tear down a session replaced by `successor`. Failures are logged;
    /// the successor is already signed in.
    async fn retire(&self, previous: ActiveSession, successor: &Session) {
        let cancelled = previous.registry.close();

        if &previous.user_id != successor.user_id() {
            let presence =
                lock_db(&self.db).set_presence(&previous.user_id, false, chrono::Utc::now());
            if let Err(e) = presence {
                tracing::warn!(error = %e, "failed to clear presence of replaced session");
            }
        }

        if previous.token != successor.token() {
            if let Err(e) = self.provider.revoke_session(&previous.token).await {
                tracing::warn!(error = %e, "failed to revoke replaced session");
            }
        }

        tracing::info!(
            previous = %previous.user_id.short(),
            user = %successor.user_id().short(),
            cancelled,
            "replaced signed-in session"
        );
    }
}
