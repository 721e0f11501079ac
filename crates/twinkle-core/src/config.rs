//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so an embedding host can start with zero
//! configuration.

use std::path::PathBuf;

use directories::ProjectDirs;
use twinkle_shared::constants::DEFAULT_SUBSCRIPTION_BUFFER;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite document store.
    /// Env: `TWINKLE_DB_PATH`
    /// Default: platform data directory (see `Database::default_path`).
    pub db_path: Option<PathBuf>,

    /// JSON file holding the restorable session and push token.
    /// Env: `TWINKLE_PREFERENCES_PATH`
    /// Default: `<config dir>/preferences.json`
    pub preferences_path: PathBuf,

    /// Base URL of the notification service. Dispatch is disabled when
    /// unset.
    /// Env: `TWINKLE_NOTIFIER_URL`
    pub notifier_url: Option<String>,

    /// Bearer token presented to the notification service.
    /// Env: `TWINKLE_NOTIFIER_TOKEN`
    pub notifier_token: Option<String>,

    /// Snapshots buffered per live subscription before the producer waits.
    /// Env: `TWINKLE_SUBSCRIPTION_BUFFER`
    /// Default: `16`
    pub subscription_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            preferences_path: default_preferences_path(),
            notifier_url: None,
            notifier_token: None,
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("TWINKLE_DB_PATH").filter(|s| !s.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(path) = var("TWINKLE_PREFERENCES_PATH").filter(|s| !s.is_empty()) {
            config.preferences_path = PathBuf::from(path);
        }

        if let Some(url) = var("TWINKLE_NOTIFIER_URL").filter(|s| !s.is_empty()) {
            config.notifier_url = Some(url);
        }

        if let Some(token) = var("TWINKLE_NOTIFIER_TOKEN").filter(|s| !s.is_empty()) {
            config.notifier_token = Some(token);
        }

        if let Some(val) = var("TWINKLE_SUBSCRIPTION_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.subscription_buffer = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid TWINKLE_SUBSCRIPTION_BUFFER, using default"
                ),
            }
        }

        config
    }
}

fn default_preferences_path() -> PathBuf {
    match ProjectDirs::from("app", "twinkle", "twinkle") {
        Some(dirs) => dirs.config_dir().join("preferences.json"),
        None => PathBuf::from("twinkle-preferences.json"),
    }
}
