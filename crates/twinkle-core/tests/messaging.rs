use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use twinkle_core::{
    AuthErrorReason, ConversationIndex, DispatchError, IdentityStore, LocalIdentityProvider,
    NotificationDispatcher, PreferenceStore, SendError, Session, SharedDatabase,
    SubscriptionError, Subscription,
};
use twinkle_shared::notify::{NewMessageNotice, ReadNotice};
use twinkle_shared::MessageId;
use twinkle_store::Database;

/// Forwards every notice it is given to the test.
struct RecordingDispatcher {
    created: mpsc::UnboundedSender<NewMessageNotice>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn message_created(&self, notice: &NewMessageNotice) -> Result<(), DispatchError> {
        let _ = self.created.send(notice.clone());
        Ok(())
    }

    async fn messages_read(&self, _notice: &ReadNotice) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Always fails, to show dispatch errors never reach the sender.
struct BrokenDispatcher;

#[async_trait]
impl NotificationDispatcher for BrokenDispatcher {
    async fn message_created(&self, _notice: &NewMessageNotice) -> Result<(), DispatchError> {
        Err(DispatchError::Status(503))
    }

    async fn messages_read(&self, _notice: &ReadNotice) -> Result<(), DispatchError> {
        Err(DispatchError::Status(503))
    }
}

fn shared_db() -> SharedDatabase {
    Arc::new(Mutex::new(Database::open_in_memory().unwrap()))
}

/// One device: its own preference file, the shared store.
fn device(db: &SharedDatabase, dispatcher: Arc<dyn NotificationDispatcher>) -> IdentityStore {
    IdentityStore::new(
        db.clone(),
        Arc::new(LocalIdentityProvider::new(db.clone())),
        PreferenceStore::in_memory(),
        dispatcher,
    )
}

async fn sign_up(db: &SharedDatabase, email: &str, name: &str) -> (IdentityStore, Session) {
    let store = device(db, Arc::new(twinkle_core::NoopDispatcher));
    let session = store.sign_up(email, "hunter22", name).await.unwrap();
    (store, session)
}

/// Receive snapshots until one satisfies `done`.
async fn wait_for<T, F>(sub: &mut Subscription<T>, done: F) -> Vec<T>
where
    F: Fn(&[T]) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = sub.recv().await.expect("subscription ended");
            if done(&snapshot) {
                return snapshot;
            }
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

#[tokio::test]
async fn test_send_read_send_scenario() {
    let db = shared_db();
    let (_a_dev, alice) = sign_up(&db, "alice@example.com", "Alice").await;
    let (_b_dev, bob) = sign_up(&db, "bob@example.com", "Bob").await;
    let conv = ConversationIndex::conversation_id(alice.user_id(), bob.user_id());

    let hi = alice.messages().send("hi", bob.user_id()).await.unwrap();
    assert_eq!(hi.conversation_id, conv);
    assert!(!hi.is_read);
    assert_eq!(bob.delivery().unread_count(&conv).unwrap(), 1);

    let mut bobs_list = bob.conversations().subscribe().await.unwrap();
    let list = wait_for(&mut bobs_list, |l| !l.is_empty()).await;
    assert_eq!(list[0].conversation.last_message, "hi");
    assert_eq!(list[0].conversation.last_message_timestamp, hi.timestamp);
    assert_eq!(list[0].conversation.unread_count, 1);
    assert_eq!(
        list[0].counterpart.as_ref().map(|u| u.display_name.as_str()),
        Some("Alice")
    );

    assert_eq!(bob.delivery().mark_read(&conv).await.unwrap(), 1);
    assert_eq!(bob.delivery().unread_count(&conv).unwrap(), 0);
    assert_eq!(bob.delivery().recompute(&conv).await.unwrap(), 0);

    let there = alice.messages().send("there", bob.user_id()).await.unwrap();
    assert_eq!(bob.delivery().unread_count(&conv).unwrap(), 1);

    let mut log = bob.messages().subscribe(&conv).await.unwrap();
    let messages = wait_for(&mut log, |m| m.len() == 2).await;
    let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "there"]);
    assert!(messages[0].is_read);
    assert!(!messages[1].is_read);
    assert!(messages[0].timestamp <= messages[1].timestamp);
    assert_eq!(messages[1].id, there.id);
}

#[tokio::test]
async fn test_counters_are_per_reader() {
    let db = shared_db();
    let (_a, alice) = sign_up(&db, "alice@example.com", "Alice").await;
    let (_b, bob) = sign_up(&db, "bob@example.com", "Bob").await;
    let conv = ConversationIndex::conversation_id(alice.user_id(), bob.user_id());

    alice.messages().send("1", bob.user_id()).await.unwrap();
    alice.messages().send("2", bob.user_id()).await.unwrap();
    bob.messages().send("3", alice.user_id()).await.unwrap();

    assert_eq!(bob.delivery().unread_count(&conv).unwrap(), 2);
    assert_eq!(alice.delivery().unread_count(&conv).unwrap(), 1);

    // Alice reading does not touch Bob's unread messages.
    assert_eq!(alice.delivery().mark_read(&conv).await.unwrap(), 1);
    assert_eq!(bob.delivery().recompute(&conv).await.unwrap(), 2);
}

#[tokio::test]
async fn test_replaced_subscription_gets_nothing_more() {
    let db = shared_db();
    let (_a, alice) = sign_up(&db, "alice@example.com", "Alice").await;
    let (_b, bob) = sign_up(&db, "bob@example.com", "Bob").await;
    let (_c, carol) = sign_up(&db, "carol@example.com", "Carol").await;

    let with_bob = ConversationIndex::conversation_id(alice.user_id(), bob.user_id());
    let with_carol = ConversationIndex::conversation_id(alice.user_id(), carol.user_id());

    let mut stale = alice.messages().subscribe(&with_bob).await.unwrap();
    assert!(stale.recv().await.unwrap().is_empty());

    let mut fresh = alice.messages().subscribe(&with_carol).await.unwrap();
    assert!(stale.is_cancelled());

    bob.messages().send("for the stale view", alice.user_id()).await.unwrap();
    carol.messages().send("for the fresh view", alice.user_id()).await.unwrap();

    let messages = wait_for(&mut fresh, |m| !m.is_empty()).await;
    assert_eq!(messages[0].text, "for the fresh view");
    assert!(stale.recv().await.is_none());
}

#[tokio::test]
async fn test_sign_out_tears_down_views() {
    let db = shared_db();
    let (alice_dev, alice) = sign_up(&db, "alice@example.com", "Alice").await;
    let (_b, bob) = sign_up(&db, "bob@example.com", "Bob").await;
    let conv = ConversationIndex::conversation_id(alice.user_id(), bob.user_id());

    let mut list = alice.conversations().subscribe().await.unwrap();
    let mut log = alice.messages().subscribe(&conv).await.unwrap();
    let mut people = alice.conversations().list_other_users().await.unwrap();
    let alice_id = alice.user_id().clone();

    alice_dev.sign_out(alice).await.unwrap();
    bob.messages().send("anyone there?", &alice_id).await.unwrap();

    assert!(list.recv().await.is_none());
    assert!(log.recv().await.is_none());
    assert!(people.recv().await.is_none());

    // Bob's directory sees Alice go offline.
    let mut directory = bob.conversations().list_other_users().await.unwrap();
    let users = wait_for(&mut directory, |u| !u.is_empty()).await;
    assert_eq!(users[0].id, alice_id);
    assert!(!users[0].is_online);
}

#[tokio::test]
async fn test_foreign_conversation_is_refused() {
    let db = shared_db();
    let (_a, alice) = sign_up(&db, "alice@example.com", "Alice").await;

    let x = twinkle_shared::UserId::parse("x").unwrap();
    let y = twinkle_shared::UserId::parse("y").unwrap();
    let not_mine = ConversationIndex::conversation_id(&x, &y);

    assert!(matches!(
        alice.messages().subscribe(&not_mine).await,
        Err(SubscriptionError::NotParticipant(_))
    ));
}

#[tokio::test]
async fn test_dispatch_follows_durable_append() {
    let db = shared_db();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let alice_dev = device(&db, Arc::new(RecordingDispatcher { created: tx }));
    let alice = alice_dev
        .sign_up("alice@example.com", "hunter22", "Alice")
        .await
        .unwrap();
    let (_b, bob) = sign_up(&db, "bob@example.com", "Bob").await;

    let sent = alice.messages().send("ping", bob.user_id()).await.unwrap();
    let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.message_id, sent.id);
    assert_eq!(notice.conversation_id, sent.conversation_id);
}

#[tokio::test]
async fn test_dispatch_failure_does_not_fail_send() {
    let db = shared_db();
    let dev = device(&db, Arc::new(BrokenDispatcher));
    let alice = dev.sign_up("alice@example.com", "hunter22", "Alice").await.unwrap();
    let (_b, bob) = sign_up(&db, "bob@example.com", "Bob").await;

    let sent = alice.messages().send("still stored", bob.user_id()).await.unwrap();
    assert_eq!(
        db.lock().unwrap().get_message(&sent.id).unwrap().text,
        "still stored"
    );
}

#[tokio::test]
async fn test_idempotent_send_with_client_id() {
    let db = shared_db();
    let (_a, alice) = sign_up(&db, "alice@example.com", "Alice").await;
    let (_b, bob) = sign_up(&db, "bob@example.com", "Bob").await;
    let conv = ConversationIndex::conversation_id(alice.user_id(), bob.user_id());

    let id = MessageId::new();
    alice.messages().send_with_id(id, "once", bob.user_id()).await.unwrap();
    let err = alice
        .messages()
        .send_with_id(id, "once", bob.user_id())
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Duplicate(dup) if dup == id));

    // The retry touched neither the log nor the counter.
    assert_eq!(db.lock().unwrap().list_messages(&conv).unwrap().len(), 1);
    assert_eq!(bob.delivery().unread_count(&conv).unwrap(), 1);
}

#[tokio::test]
async fn test_metadata_failure_keeps_message_and_is_repairable() {
    let db = shared_db();
    let (_a, alice) = sign_up(&db, "alice@example.com", "Alice").await;
    let (_b, bob) = sign_up(&db, "bob@example.com", "Bob").await;
    let conv = ConversationIndex::conversation_id(alice.user_id(), bob.user_id());

    db.lock()
        .unwrap()
        .conn()
        .execute_batch("ALTER TABLE unread_counters RENAME TO unread_counters_off")
        .unwrap();

    let err = alice.messages().send("hello?", bob.user_id()).await.unwrap_err();
    let SendError::ConversationUpdate { message_id, .. } = err else {
        panic!("expected a conversation update failure, got {err:?}");
    };
    {
        let guard = db.lock().unwrap();
        assert_eq!(guard.get_message(&message_id).unwrap().text, "hello?");
        // The conversation upsert rolled back together with the counter.
        assert!(guard.get_conversation_for(&conv, bob.user_id()).is_err());
        guard
            .conn()
            .execute_batch("ALTER TABLE unread_counters_off RENAME TO unread_counters")
            .unwrap();
    }

    assert_eq!(bob.delivery().recompute(&conv).await.unwrap(), 1);

    // The repair also brings the conversation back into both indexes.
    for session in [&bob, &alice] {
        let mut index = session.conversations().subscribe().await.unwrap();
        let list = wait_for(&mut index, |views| !views.is_empty()).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].conversation.id, conv);
        assert_eq!(list[0].conversation.last_message, "hello?");
    }
    let repaired = db.lock().unwrap().get_conversation_for(&conv, bob.user_id()).unwrap();
    assert_eq!(repaired.unread_count, 1);
}

#[tokio::test]
async fn test_restore_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("twinkle.db");
    let prefs_path = dir.path().join("prefs.json");

    let config = twinkle_core::ClientConfig {
        db_path: Some(db_path),
        preferences_path: prefs_path,
        notifier_url: None,
        notifier_token: None,
        subscription_buffer: 4,
    };

    let user_id = {
        let store = IdentityStore::open(&config).unwrap();
        let session = store.sign_up("alice@example.com", "hunter22", "Alice").await.unwrap();
        session.user_id().clone()
    };

    let store = IdentityStore::open(&config).unwrap();
    let restored = store.restore().await.unwrap().expect("session restored");
    assert_eq!(restored.user_id(), &user_id);
    assert!(restored.user().is_online);

    store.sign_out(restored).await.unwrap();
    let store = IdentityStore::open(&config).unwrap();
    assert!(store.restore().await.unwrap().is_none());

    let err = store.sign_in("alice@example.com", "wrong-pw").await.unwrap_err();
    assert!(err.is(AuthErrorReason::InvalidCredentials));
}
