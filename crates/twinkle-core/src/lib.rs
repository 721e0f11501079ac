//! # twinkle-core
//!
//! Client-side messaging core for Twinkle.
//!
//! Start from an [`IdentityStore`]; signing in yields a [`Session`] from
//! which the [`ConversationIndex`], [`MessageLog`] and [`DeliveryTracker`]
//! are borrowed. Live views are [`Subscription`]s: bounded queues of full
//! snapshots, cancelled on replacement, on drop, or when the session
//! signs out.

pub mod config;
pub mod conversations;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod message_log;
pub mod preferences;
pub mod provider;
pub mod session;
pub mod subscription;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use conversations::{ConversationIndex, ConversationView};
pub use delivery::DeliveryTracker;
pub use dispatch::{HttpDispatcher, NoopDispatcher, NotificationDispatcher};
pub use error::{
    AuthError, AuthErrorReason, DispatchError, OpenError, PreferencesError, SendError,
    SubscriptionError, SyncError,
};
pub use identity::IdentityStore;
pub use message_log::MessageLog;
pub use preferences::{PreferenceStore, Preferences};
pub use provider::{IdentityProvider, LocalIdentityProvider};
pub use session::{Session, SharedDatabase};
pub use subscription::Subscription;

/// Install a `tracing` subscriber for hosts that do not bring their own.
/// Respects `RUST_LOG`. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("twinkle_core=debug,twinkle_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
