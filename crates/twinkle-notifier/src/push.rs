//! Push gateway client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use twinkle_shared::constants::{PUSH_ERROR_INVALID_TOKEN, PUSH_ERROR_UNREGISTERED};
use twinkle_shared::notify::PushMessage;

#[derive(Debug, Error)]
pub enum PushError {
    /// The gateway no longer accepts this device token.
    #[error("Push token rejected ({0})")]
    StaleToken(String),

    #[error("Push gateway error: {0}")]
    Gateway(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PushError {
    /// Classify a gateway error code.
    pub fn from_code(code: &str, message: &str) -> Self {
        if code == PUSH_ERROR_INVALID_TOKEN || code == PUSH_ERROR_UNREGISTERED {
            PushError::StaleToken(code.to_string())
        } else {
            PushError::Gateway(format!("{code}: {message}"))
        }
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, push: &PushMessage) -> Result<(), PushError>;
}

/// Posts [`PushMessage`]s as JSON to an HTTP push gateway.
pub struct HttpPushGateway {
    client: reqwest::Client,
    url: String,
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpPushGateway {
    pub fn new(url: &str, key: Option<String>) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            key,
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, push: &PushMessage) -> Result<(), PushError> {
        let mut request = self.client.post(&self.url).json(push);
        if let Some(ref key) = self.key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(parse_error_body(status.as_u16(), &body))
    }
}

fn parse_error_body(status: u16, body: &str) -> PushError {
    match serde_json::from_str::<GatewayErrorBody>(body) {
        Ok(parsed) => PushError::from_code(&parsed.error.code, &parsed.error.message),
        Err(_) => PushError::Gateway(format!("status {status}")),
    }
}

/// Stand-in used when no gateway is configured: pushes are logged and
/// reported as delivered.
pub struct LoggingGateway;

#[async_trait]
impl PushGateway for LoggingGateway {
    async fn send(&self, push: &PushMessage) -> Result<(), PushError> {
        tracing::info!(
            title = %push.title,
            conversation = push.data.get("conversationId").map(String::as_str).unwrap_or(""),
            "push gateway not configured, dropping push"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Records pushes and answers with a scripted error code, if any.
    #[derive(Default)]
    pub(crate) struct MockGateway {
        pub sent: Mutex<Vec<PushMessage>>,
        pub fail_with: Option<&'static str>,
    }

    impl MockGateway {
        pub(crate) fn failing(code: &'static str) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_with: Some(code),
            }
        }

        pub(crate) fn sent(&self) -> Vec<PushMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushGateway for MockGateway {
        async fn send(&self, push: &PushMessage) -> Result<(), PushError> {
            self.sent.lock().unwrap().push(push.clone());
            match self.fail_with {
                Some(code) => Err(PushError::from_code(code, "scripted failure")),
                None => Ok(()),
            }
        }
    }
}
