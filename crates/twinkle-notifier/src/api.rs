use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;
use twinkle_shared::credentials::secrets_match;
use twinkle_shared::notify::{NewMessageNotice, NotifyOutcome, ReadNotice};
use twinkle_store::Database;

use crate::config::NotifierConfig;
use crate::error::NotifierError;
use crate::notify::{self, ReadOutcome};
use crate::push::PushGateway;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub gateway: Arc<dyn PushGateway>,
    pub config: Arc<NotifierConfig>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/messages/created", post(message_created))
        .route("/v1/messages/read", post(messages_read))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn message_created(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(notice): Json<NewMessageNotice>,
) -> Result<Json<NotifyOutcome>, NotifierError> {
    verify_token(&headers, &state.config)?;
    let outcome = notify::message_created(&state, &notice).await?;
    Ok(Json(outcome))
}

async fn messages_read(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(notice): Json<ReadNotice>,
) -> Result<Json<ReadOutcome>, NotifierError> {
    verify_token(&headers, &state.config)?;
    let outcome = notify::messages_read(&state, &notice).await?;
    Ok(Json(outcome))
}

/// Accept any request when no token is configured.
fn verify_token(headers: &HeaderMap, config: &NotifierConfig) -> Result<(), NotifierError> {
    let Some(ref expected) = config.notifier_token else {
        return Ok(());
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    if !secrets_match(token, expected) {
        return Err(NotifierError::Unauthorized);
    }

    Ok(())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
