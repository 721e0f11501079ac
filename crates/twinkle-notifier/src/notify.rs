//! Notification handlers: turn client notices into pushes and counter
//! repairs.

use serde::Serialize;
use tracing::{debug, info, warn};
use twinkle_shared::notify::{NewMessageNotice, NotifyOutcome, PushMessage, ReadNotice, SkipReason};
use twinkle_store::StoreError;

use crate::api::AppState;
use crate::error::NotifierError;
use crate::push::PushError;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadOutcome {
    pub unread_count: u32,
}

/// Push the receiver of a freshly created message.
///
/// Store lookups happen under the database lock; the gateway call does not.
pub async fn message_created(
    state: &AppState,
    notice: &NewMessageNotice,
) -> Result<NotifyOutcome, NotifierError> {
    let (message, receiver) = {
        let db = state.db.lock().await;

        let message = match db.get_message(&notice.message_id) {
            Ok(m) if m.conversation_id == notice.conversation_id => m,
            Ok(_) | Err(StoreError::NotFound) => {
                debug!(message = %notice.message_id, "notice for unknown message");
                return Ok(skipped(SkipReason::MessageNotFound));
            }
            Err(e) => return Err(e.into()),
        };

        let receiver = match db.get_user(&message.receiver_id) {
            Ok(u) => u,
            Err(StoreError::NotFound) => return Ok(skipped(SkipReason::ReceiverNotFound)),
            Err(e) => return Err(e.into()),
        };

        (message, receiver)
    };

    let Some(token) = receiver.push_token.clone() else {
        return Ok(skipped(SkipReason::NoPushToken));
    };

    if state.config.skip_online_recipients && receiver.is_online {
        return Ok(skipped(SkipReason::ReceiverOnline));
    }

    let push = PushMessage::new_message(
        &token,
        &message.conversation_id,
        &message.id,
        &message.sender_id,
        &message.sender_name,
        &message.text,
    );

    match state.gateway.send(&push).await {
        Ok(()) => {
            info!(
                conversation = %message.conversation_id,
                receiver = %receiver.id.short(),
                "push sent"
            );
            Ok(NotifyOutcome::Sent)
        }
        Err(PushError::StaleToken(code)) => {
            let db = state.db.lock().await;
            let cleared = db.clear_push_token(&receiver.id, Some(&token))?;
            info!(
                receiver = %receiver.id.short(),
                code = %code,
                cleared,
                "gateway rejected push token"
            );
            Ok(NotifyOutcome::TokenCleared)
        }
        Err(e) => {
            warn!(receiver = %receiver.id.short(), error = %e, "push failed");
            Ok(NotifyOutcome::Failed {
                error: e.to_string(),
            })
        }
    }
}

/// Re-derive the reader's unread counter from the messages themselves.
pub async fn messages_read(
    state: &AppState,
    notice: &ReadNotice,
) -> Result<ReadOutcome, NotifierError> {
    if !notice.conversation_id.involves(&notice.user_id) {
        return Err(NotifierError::BadRequest(format!(
            "user {} is not a participant of {}",
            notice.user_id, notice.conversation_id
        )));
    }

    let db = state.db.lock().await;
    let unread_count = db.recompute_unread(&notice.conversation_id, &notice.user_id)?;
    debug!(
        conversation = %notice.conversation_id,
        reader = %notice.user_id.short(),
        unread_count,
        "unread counter recomputed"
    );
    Ok(ReadOutcome { unread_count })
}

fn skipped(reason: SkipReason) -> NotifyOutcome {
    NotifyOutcome::Skipped { reason }
}
