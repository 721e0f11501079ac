use std::fmt;

use serde::Serialize;
use thiserror::Error;
use twinkle_shared::MessageId;
use twinkle_store::StoreError;

/// Why an identity operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorReason {
    InvalidCredentials,
    DuplicateAccount,
    SessionExpired,
    InvalidEmail,
    WeakPassword,
    /// The store or the local preference file could not be reached.
    Unavailable,
}

impl fmt::Display for AuthErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthErrorReason::InvalidCredentials => "invalid credentials",
            AuthErrorReason::DuplicateAccount => "account already exists",
            AuthErrorReason::SessionExpired => "session expired",
            AuthErrorReason::InvalidEmail => "invalid email address",
            AuthErrorReason::WeakPassword => "password too weak",
            AuthErrorReason::Unavailable => "identity service unavailable",
        };
        f.write_str(s)
    }
}

/// Single error kind for sign-in, sign-up, restore and sign-out,
/// distinguished by [`AuthErrorReason`].
#[derive(Debug, Error)]
#[error("{reason}: {message}")]
pub struct AuthError {
    pub reason: AuthErrorReason,
    pub message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    pub fn new(reason: AuthErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            reason: AuthErrorReason::Unavailable,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn is(&self, reason: AuthErrorReason) -> bool {
        self.reason == reason
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    /// A message with this id was already appended; nothing was written.
    #[error("Duplicate message id {0}")]
    Duplicate(MessageId),

    #[error("Failed to append message: {0}")]
    Append(#[source] StoreError),

    /// The message is durable but the conversation metadata was not
    /// updated. The receiver's counter can be repaired by recomputation.
    #[error("Message {message_id} stored but conversation update failed: {source}")]
    ConversationUpdate {
        message_id: MessageId,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// The read-flag batch failed; no message changed state.
    #[error("Failed to mark messages read: {0}")]
    Batch(#[source] StoreError),

    /// Messages were flagged but the counter still holds its old value.
    #[error("Marked {flipped} message(s) read but counter reset failed: {source}")]
    CounterReset {
        flipped: usize,
        #[source]
        source: StoreError,
    },

    #[error("Failed to recompute unread counter: {0}")]
    Recompute(#[source] StoreError),

    #[error("Failed to read unread counter: {0}")]
    Counter(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Session is closed")]
    SessionClosed,

    #[error("Not a participant of conversation {0}")]
    NotParticipant(String),

    #[error("Failed to load initial view: {0}")]
    InitialLoad(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notifier responded {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid preferences file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to assemble the client core from configuration.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
