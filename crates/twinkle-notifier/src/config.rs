//! Notifier configuration loaded from environment variables.
//!
//! All settings have defaults so the service can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use twinkle_shared::constants::{
    DEFAULT_NOTIFIER_PORT, MAINTENANCE_INTERVAL_SECS, MESSAGE_RETENTION_DAYS,
};

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Document store shared with the clients.
    /// Env: `TWINKLE_DB_PATH`
    /// Default: platform data directory.
    pub db_path: Option<PathBuf>,

    /// Push gateway endpoint. Pushes are only logged when unset.
    /// Env: `PUSH_GATEWAY_URL`
    pub push_gateway_url: Option<String>,

    /// Credential presented to the push gateway.
    /// Env: `PUSH_GATEWAY_KEY`
    pub push_gateway_key: Option<String>,

    /// Bearer token clients must present. Requests are not authenticated
    /// when unset.
    /// Env: `NOTIFIER_TOKEN`
    pub notifier_token: Option<String>,

    /// Skip pushes to receivers whose presence flag is set; an online
    /// client already shows the message.
    /// Env: `SKIP_ONLINE_RECIPIENTS` (true/false)
    /// Default: `true`
    pub skip_online_recipients: bool,

    /// Messages older than this are purged.
    /// Env: `RETENTION_DAYS`
    /// Default: `30`
    pub retention_days: i64,

    /// Time between maintenance runs.
    /// Env: `MAINTENANCE_INTERVAL_SECS`
    /// Default: `86400`
    pub maintenance_interval: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_NOTIFIER_PORT).into(),
            db_path: None,
            push_gateway_url: None,
            push_gateway_key: None,
            notifier_token: None,
            skip_online_recipients: true,
            retention_days: MESSAGE_RETENTION_DAYS,
            maintenance_interval: Duration::from_secs(MAINTENANCE_INTERVAL_SECS),
        }
    }
}

impl NotifierConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = non_empty(var("TWINKLE_DB_PATH")) {
            config.db_path = Some(PathBuf::from(path));
        }

        config.push_gateway_url = non_empty(var("PUSH_GATEWAY_URL"));
        config.push_gateway_key = non_empty(var("PUSH_GATEWAY_KEY"));
        config.notifier_token = non_empty(var("NOTIFIER_TOKEN"));

        if let Some(val) = var("SKIP_ONLINE_RECIPIENTS") {
            match val.as_str() {
                "true" | "1" => config.skip_online_recipients = true,
                "false" | "0" => config.skip_online_recipients = false,
                _ => tracing::warn!(value = %val, "Invalid SKIP_ONLINE_RECIPIENTS, using default"),
            }
        }

        if let Some(val) = var("RETENTION_DAYS") {
            match val.parse::<i64>() {
                Ok(days) if (1..=36_500).contains(&days) => config.retention_days = days,
                _ => tracing::warn!(value = %val, "Invalid RETENTION_DAYS, using default"),
            }
        }

        if let Some(val) = var("MAINTENANCE_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.maintenance_interval = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid MAINTENANCE_INTERVAL_SECS, using default"
                ),
            }
        }

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
