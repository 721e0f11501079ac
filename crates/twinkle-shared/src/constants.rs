/// Application name
pub const APP_NAME: &str = "Twinkle";

/// Joins the two sorted participant ids of a conversation
pub const CONVERSATION_ID_SEPARATOR: char = '_';

/// Messages older than this are purged by the maintenance job
pub const MESSAGE_RETENTION_DAYS: i64 = 30;

/// Default interval between maintenance runs (24 hours)
pub const MAINTENANCE_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Push notification time-to-live in seconds (24 hours)
pub const PUSH_TTL_SECS: u64 = 24 * 60 * 60;

/// Push `data.type` value for a freshly created message
pub const PUSH_TYPE_NEW_MESSAGE: &str = "new_message";

/// Gateway error codes meaning the device token must be forgotten
pub const PUSH_ERROR_INVALID_TOKEN: &str = "messaging/invalid-registration-token";
pub const PUSH_ERROR_UNREGISTERED: &str = "messaging/registration-token-not-registered";

/// Minimum password length accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// Salt size for password hashes in bytes
pub const PASSWORD_SALT_SIZE: usize = 16;

/// Number of BLAKE3 rounds applied when stretching a password
pub const PASSWORD_HASH_ROUNDS: u32 = 10_000;

/// Session token size in bytes (hex encoded on the wire)
pub const SESSION_TOKEN_SIZE: usize = 32;

/// Default capacity of a live subscription queue
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;

/// Capacity of the store change feed
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// Default HTTP port of the notification service
pub const DEFAULT_NOTIFIER_PORT: u16 = 8080;

/// Key derivation context (BLAKE3)
pub const KDF_CONTEXT_PASSWORD: &str = "twinkle-password-v1";
