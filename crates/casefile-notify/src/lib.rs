//! Status fan-out to live subscribers.
//!
//! A publish/subscribe registry keyed by file id, decoupled from both the
//! state machine that produces events and the transport that delivers
//! them. The orchestrator publishes a value-type event after each
//! transition; the SSE layer is an adapter over a subscription.

use std::collections::HashMap;
use std::sync::Arc;

use casefile_core::models::FileStatusEvent;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Buffered events per subscriber before lagging receivers drop messages.
const CHANNEL_CAPACITY: usize = 256;

struct NotifierInner {
    /// Collection subscribers: every event for every file.
    global_tx: broadcast::Sender<FileStatusEvent>,
    /// Per-file channels, created on first subscribe and pruned once the
    /// last receiver is gone.
    per_file: RwLock<HashMap<Uuid, broadcast::Sender<FileStatusEvent>>>,
}

/// Registry of live status subscribers.
///
/// Publishing never blocks on slow consumers: `broadcast` drops the oldest
/// buffered event for a lagging receiver instead of back-pressuring the
/// worker.
#[derive(Clone)]
pub struct StatusNotifier {
    inner: Arc<NotifierInner>,
}

impl StatusNotifier {
    pub fn new() -> Self {
        let (global_tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(NotifierInner {
                global_tx,
                per_file: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to one file's status events.
    pub async fn subscribe_file(&self, file_id: Uuid) -> broadcast::Receiver<FileStatusEvent> {
        let mut per_file = self.inner.per_file.write().await;
        per_file
            .entry(file_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to status events for all files.
    pub fn subscribe_all(&self) -> broadcast::Receiver<FileStatusEvent> {
        self.inner.global_tx.subscribe()
    }

    /// Publish a transition to the file's subscribers and the collection
    /// channel. A channel whose subscribers have all disconnected is
    /// pruned here rather than on unsubscribe.
    pub async fn publish(&self, event: FileStatusEvent) {
        let _ = self.inner.global_tx.send(event.clone());

        let file_id = event.file_id;
        let delivered = {
            let per_file = self.inner.per_file.read().await;
            match per_file.get(&file_id) {
                Some(sender) => sender.send(event).is_ok(),
                None => return,
            }
        };

        if !delivered {
            let mut per_file = self.inner.per_file.write().await;
            if let Some(sender) = per_file.get(&file_id) {
                if sender.receiver_count() == 0 {
                    per_file.remove(&file_id);
                    tracing::trace!(file_id = %file_id, "Pruned idle status channel");
                }
            }
        }
    }

    /// Number of files with at least one live channel (for tests and
    /// introspection).
    pub async fn tracked_files(&self) -> usize {
        self.inner.per_file.read().await.len()
    }
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_core::models::{FileStatus, SanitizeStatus, ScanStatus};

    fn event(file_id: Uuid, scan_status: ScanStatus) -> FileStatusEvent {
        FileStatusEvent {
            file_id,
            status: FileStatus::Processing,
            scan_status,
            sanitize_status: SanitizeStatus::None,
            processing_error: None,
            safe_path: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_transitions_in_publish_order() {
        let notifier = StatusNotifier::new();
        let file_id = Uuid::new_v4();
        let mut rx = notifier.subscribe_file(file_id).await;

        notifier.publish(event(file_id, ScanStatus::Scanning)).await;
        notifier.publish(event(file_id, ScanStatus::Clean)).await;

        assert_eq!(rx.recv().await.unwrap().scan_status, ScanStatus::Scanning);
        assert_eq!(rx.recv().await.unwrap().scan_status, ScanStatus::Clean);
    }

    #[tokio::test]
    async fn file_subscriber_does_not_see_other_files() {
        let notifier = StatusNotifier::new();
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let mut rx = notifier.subscribe_file(mine).await;

        notifier.publish(event(theirs, ScanStatus::Scanning)).await;
        notifier.publish(event(mine, ScanStatus::Clean)).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.file_id, mine);
        assert_eq!(received.scan_status, ScanStatus::Clean);
    }

    #[tokio::test]
    async fn collection_subscriber_sees_every_file() {
        let notifier = StatusNotifier::new();
        let mut rx = notifier.subscribe_all();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        notifier.publish(event(a, ScanStatus::Scanning)).await;
        notifier.publish(event(b, ScanStatus::Scanning)).await;

        assert_eq!(rx.recv().await.unwrap().file_id, a);
        assert_eq!(rx.recv().await.unwrap().file_id, b);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let notifier = StatusNotifier::new();
        notifier.publish(event(Uuid::new_v4(), ScanStatus::Clean)).await;
    }

    #[tokio::test]
    async fn idle_channels_are_pruned() {
        let notifier = StatusNotifier::new();
        let file_id = Uuid::new_v4();

        let rx = notifier.subscribe_file(file_id).await;
        assert_eq!(notifier.tracked_files().await, 1);
        drop(rx);

        notifier.publish(event(file_id, ScanStatus::Clean)).await;
        assert_eq!(notifier.tracked_files().await, 0);
    }
}
