//! # twinkle-notifier
//!
//! Notification service for Twinkle.
//!
//! This binary provides:
//! - **Push fan-out**: clients report freshly created messages and the
//!   receiver's device is pushed through the configured gateway
//! - **Counter repair**: read notices re-derive the reader's unread counter
//! - **Retention**: a periodic job purges old messages and fixes counters

mod api;
mod config;
mod error;
mod maintenance;
mod notify;
mod push;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use twinkle_store::Database;

use crate::api::AppState;
use crate::config::NotifierConfig;
use crate::push::{HttpPushGateway, LoggingGateway, PushGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,twinkle_notifier=debug")),
        )
        .init();

    info!("Starting Twinkle notifier v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NotifierConfig::from_env();
    info!(
        addr = %config.http_addr,
        gateway = config.push_gateway_url.as_deref().unwrap_or("<log only>"),
        auth_enabled = config.notifier_token.is_some(),
        skip_online = config.skip_online_recipients,
        retention_days = config.retention_days,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match config.db_path {
        Some(ref path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let db = Arc::new(Mutex::new(db));

    let gateway: Arc<dyn PushGateway> = match config.push_gateway_url {
        Some(ref url) => Arc::new(HttpPushGateway::new(url, config.push_gateway_key.clone())?),
        None => Arc::new(LoggingGateway),
    };

    let app_state = AppState {
        db: db.clone(),
        gateway,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    let _maintenance = maintenance::spawn(db, config.retention_days, config.maintenance_interval);

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
