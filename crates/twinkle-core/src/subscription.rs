//! Live views over the document store.
//!
//! A [`Subscription`] is a bounded queue of complete snapshots fed by a
//! background task. The task listens to the store's change feed and
//! reloads its query whenever a relevant change lands. The producer waits
//! for queue space rather than dropping anything; since every item is a
//! full snapshot, a slow consumer only ever sees a later, complete view.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use twinkle_store::{ChangeEvent, Database};

use crate::error::SubscriptionError;
use crate::session::{lock_db, SharedDatabase};

/// A standing query that can be re-evaluated against the store.
pub(crate) trait LiveQuery: Send + 'static {
    type Item: Send + 'static;

    /// Whether `change` may alter this query's result.
    fn is_relevant(&self, change: &ChangeEvent) -> bool;

    fn load(&mut self, db: &Database) -> twinkle_store::Result<Vec<Self::Item>>;
}

/// Cancellation side of a subscription, shared with its registry.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
    task: AbortHandle,
}

impl SubscriptionHandle {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.is_cancelled() || self.task.is_finished()
    }
}

/// Receiving end of a live view.
///
/// Once cancelled (explicitly, by replacement, or by sign-out) it yields
/// `None`, even if snapshots were still buffered. Dropping it cancels the
/// producer.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<Vec<T>>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot.
    pub async fn recv(&mut self) -> Option<Vec<T>> {
        if self.handle.is_cancelled() {
            return None;
        }
        let snapshot = self.rx.recv().await?;
        if self.handle.is_cancelled() {
            return None;
        }
        Some(snapshot)
    }

    /// Take a buffered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Vec<T>> {
        if self.handle.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub(crate) fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Vec<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.handle.is_cancelled() {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(_)) if this.handle.is_cancelled() => Poll::Ready(None),
            other => other,
        }
    }
}

/// Load the initial snapshot and start the producer task.
///
/// The change feed is subscribed before the first load so that no write
/// can fall between the snapshot and the first awaited event.
pub(crate) fn spawn_live<Q: LiveQuery>(
    db: SharedDatabase,
    mut query: Q,
    buffer: usize,
) -> Result<Subscription<Q::Item>, SubscriptionError> {
    let (changes, initial) = {
        let guard = lock_db(&db);
        let changes = guard.subscribe_changes();
        let initial = query.load(&guard).map_err(SubscriptionError::InitialLoad)?;
        (changes, initial)
    };

    let (tx, rx) = mpsc::channel(buffer.max(1));
    let task = tokio::spawn(run_live(db, query, changes, tx, initial));

    Ok(Subscription {
        rx,
        handle: SubscriptionHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
            task: task.abort_handle(),
        },
    })
}

async fn run_live<Q: LiveQuery>(
    db: SharedDatabase,
    mut query: Q,
    mut changes: broadcast::Receiver<ChangeEvent>,
    tx: mpsc::Sender<Vec<Q::Item>>,
    initial: Vec<Q::Item>,
) {
    if tx.send(initial).await.is_err() {
        return;
    }

    loop {
        match changes.recv().await {
            Ok(change) if query.is_relevant(&change) => {}
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "change feed lagged, resyncing view");
            }
            Err(RecvError::Closed) => break,
        }

        // Fold any burst of queued events into a single reload.
        loop {
            match changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        let snapshot = {
            let guard = lock_db(&db);
            query.load(&guard)
        };

        match snapshot {
            Ok(items) => {
                if tx.send(items).await.is_err() {
                    break;
                }
            }
            // Keep the view alive; the next change triggers another attempt.
            Err(e) => tracing::warn!(error = %e, "live view reload failed"),
        }
    }
}
