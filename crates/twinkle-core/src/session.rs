//! Per-session context.
//!
//! A [`Session`] exists from a successful sign-in (or restore) until
//! sign-out. It owns everything the messaging components need for one
//! signed-in user, and the registry of live views to tear down when the
//! session ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use twinkle_shared::UserId;
use twinkle_store::{Database, ProfileUpdate, User};

use crate::conversations::ConversationIndex;
use crate::delivery::DeliveryTracker;
use crate::dispatch::NotificationDispatcher;
use crate::error::{AuthError, SubscriptionError};
use crate::message_log::MessageLog;
use crate::preferences::PreferenceStore;
use crate::subscription::{LiveQuery, Subscription, SubscriptionHandle};

pub type SharedDatabase = Arc<Mutex<Database>>;
pub type SharedPreferences = Arc<Mutex<PreferenceStore>>;

/// Lock the store. A panic while the lock was held cannot leave a
/// transaction open (rusqlite rolls back on drop), so a poisoned lock is
/// still safe to use.
pub(crate) fn lock_db(db: &SharedDatabase) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock_prefs(prefs: &SharedPreferences) -> MutexGuard<'_, PreferenceStore> {
    prefs.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Subscription registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryState {
    closed: bool,
    views: Vec<SubscriptionHandle>,
    /// The one message-log view this session may hold.
    message_slot: Option<SubscriptionHandle>,
}

/// Live views opened by one session.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a view and track it for teardown.
    pub(crate) fn open<Q: LiveQuery>(
        &self,
        db: &SharedDatabase,
        query: Q,
        buffer: usize,
    ) -> Result<Subscription<Q::Item>, SubscriptionError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SubscriptionError::SessionClosed);
        }

        let sub = crate::subscription::spawn_live(db.clone(), query, buffer)?;
        state.views.retain(|h| !h.is_finished());
        state.views.push(sub.handle());
        Ok(sub)
    }

    /// Start a view in the message slot and cancel its previous occupant
    /// under the same lock, before the new view is handed out. If the new
    /// view fails to start the previous one keeps running.
    pub(crate) fn replace_message_view<Q: LiveQuery>(
        &self,
        db: &SharedDatabase,
        query: Q,
        buffer: usize,
    ) -> Result<Subscription<Q::Item>, SubscriptionError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SubscriptionError::SessionClosed);
        }

        let sub = crate::subscription::spawn_live(db.clone(), query, buffer)?;
        if let Some(previous) = state.message_slot.replace(sub.handle()) {
            previous.cancel();
        }
        Ok(sub)
    }

    /// Cancel every view and refuse new ones.
    pub(crate) fn close(&self) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.closed = true;

        let mut cancelled = 0;
        for handle in state.views.drain(..).chain(state.message_slot.take()) {
            if !handle.is_finished() {
                cancelled += 1;
            }
            handle.cancel();
        }
        cancelled
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated user's context. Obtained from
/// [`IdentityStore`](crate::IdentityStore) and ended with
/// [`IdentityStore::sign_out`](crate::IdentityStore::sign_out).
pub struct Session {
    user_id: UserId,
    user: Mutex<User>,
    token: String,
    pub(crate) db: SharedDatabase,
    pub(crate) dispatcher: Arc<dyn NotificationDispatcher>,
    preferences: SharedPreferences,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) buffer: usize,
}

impl Session {
    pub(crate) fn new(
        user: User,
        token: String,
        db: SharedDatabase,
        dispatcher: Arc<dyn NotificationDispatcher>,
        preferences: SharedPreferences,
        buffer: usize,
    ) -> Self {
        Self {
            user_id: user.id.clone(),
            user: Mutex::new(user),
            token,
            db,
            dispatcher,
            preferences,
            registry: Arc::new(SubscriptionRegistry::default()),
            buffer,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Profile as of sign-in or the last [`refresh_user`](Self::refresh_user).
    pub fn user(&self) -> User {
        self.user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub fn conversations(&self) -> ConversationIndex<'_> {
        ConversationIndex::new(self)
    }

    pub fn messages(&self) -> MessageLog<'_> {
        MessageLog::new(self)
    }

    pub fn delivery(&self) -> DeliveryTracker<'_> {
        DeliveryTracker::new(self)
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    /// Re-read the profile from the store.
    pub fn refresh_user(&self) -> Result<User, AuthError> {
        let fresh = lock_db(&self.db)
            .get_user(&self.user_id)
            .map_err(AuthError::unavailable)?;
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        Ok(fresh)
    }

    /// Register this device's push token on the user record and in the
    /// local preferences.
    pub fn update_push_token(&self, token: &str) -> Result<(), AuthError> {
        lock_db(&self.db)
            .set_push_token(&self.user_id, token)
            .map_err(AuthError::unavailable)?;
        lock_prefs(&self.preferences)
            .set_push_token(token)
            .map_err(AuthError::unavailable)?;

        tracing::debug!(user = %self.user_id, "push token updated");
        self.refresh_user().map(|_| ())
    }

    pub fn update_profile(&self, update: &ProfileUpdate) -> Result<User, AuthError> {
        lock_db(&self.db)
            .update_profile(&self.user_id, update)
            .map_err(AuthError::unavailable)?;
        self.refresh_user()
    }

    /// Stamp presence (and last seen) on the user record.
    pub(crate) fn set_presence(&self, online: bool) -> Result<(), twinkle_store::StoreError> {
        lock_db(&self.db).set_presence(&self.user_id, online, Utc::now())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"[redacted]")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use twinkle_store::ChangeEvent;

    use super::*;

    struct Nothing;

    impl LiveQuery for Nothing {
        type Item = ();

        fn is_relevant(&self, _change: &ChangeEvent) -> bool {
            false
        }

        fn load(&mut self, _db: &Database) -> twinkle_store::Result<Vec<()>> {
            Ok(Vec::new())
        }
    }

    fn shared() -> SharedDatabase {
        Arc::new(Mutex::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_close_cancels_all_and_refuses_new() {
        let db = shared();
        let registry = SubscriptionRegistry::default();

        let a = registry.open(&db, Nothing, 1).unwrap();
        let b = registry.replace_message_view(&db, Nothing, 1).unwrap();

        assert_eq!(registry.close(), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(matches!(
            registry.open(&db, Nothing, 1),
            Err(SubscriptionError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_message_slot_holds_one_view() {
        let db = shared();
        let registry = SubscriptionRegistry::default();

        let first = registry.replace_message_view(&db, Nothing, 1).unwrap();
        let second = registry.replace_message_view(&db, Nothing, 1).unwrap();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }
}
