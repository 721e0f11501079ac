//! Client side of the notification path.
//!
//! After a message is durable the core tells the notification service
//! about it; the service decides whether and where to push. Dispatch is
//! fire-and-forget: it runs on its own task and a failure is only logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use twinkle_shared::notify::{NewMessageNotice, ReadNotice};

use crate::error::DispatchError;

pub const MESSAGE_CREATED_PATH: &str = "/v1/messages/created";
pub const MESSAGES_READ_PATH: &str = "/v1/messages/read";

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// A message was appended to a conversation.
    async fn message_created(&self, notice: &NewMessageNotice) -> Result<(), DispatchError>;

    /// A reader flipped messages to read.
    async fn messages_read(&self, notice: &ReadNotice) -> Result<(), DispatchError>;
}

/// Posts notices to the notification service over HTTP.
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDispatcher {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), DispatchError> {
        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(DispatchError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for HttpDispatcher {
    async fn message_created(&self, notice: &NewMessageNotice) -> Result<(), DispatchError> {
        self.post(MESSAGE_CREATED_PATH, notice).await
    }

    async fn messages_read(&self, notice: &ReadNotice) -> Result<(), DispatchError> {
        self.post(MESSAGES_READ_PATH, notice).await
    }
}

/// Used when no notification service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn message_created(&self, _notice: &NewMessageNotice) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn messages_read(&self, _notice: &ReadNotice) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Send `notice` on a background task.
pub(crate) fn spawn_message_created(
    dispatcher: Arc<dyn NotificationDispatcher>,
    notice: NewMessageNotice,
) {
    tokio::spawn(async move {
        match dispatcher.message_created(&notice).await {
            Ok(()) => tracing::debug!(message = %notice.message_id, "dispatched new-message notice"),
            Err(e) => tracing::warn!(
                message = %notice.message_id,
                error = %e,
                "new-message notice failed"
            ),
        }
    });
}

pub(crate) fn spawn_messages_read(dispatcher: Arc<dyn NotificationDispatcher>, notice: ReadNotice) {
    tokio::spawn(async move {
        if let Err(e) = dispatcher.messages_read(&notice).await {
            tracing::warn!(
                conversation = %notice.conversation_id,
                error = %e,
                "read notice failed"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let d = HttpDispatcher::new("http://notifier.local:8080/", None).unwrap();
        assert_eq!(
            d.endpoint(MESSAGE_CREATED_PATH),
            "http://notifier.local:8080/v1/messages/created"
        );
    }

    #[tokio::test]
    async fn test_unreachable_notifier_is_an_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let d = HttpDispatcher::new("http://127.0.0.1:9", Some("t".into())).unwrap();
        let a = twinkle_shared::UserId::parse("a").unwrap();
        let b = twinkle_shared::UserId::parse("b").unwrap();
        let notice = ReadNotice {
            conversation_id: twinkle_shared::ConversationId::between(&a, &b),
            user_id: a,
        };
        assert!(matches!(d.messages_read(&notice).await, Err(DispatchError::Http(_))));
    }
}
