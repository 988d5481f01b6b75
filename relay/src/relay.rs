//! Relay core
//!
//! Orchestrates one submission: insert pending, publish, record the
//! outcome. Transport-agnostic; the HTTP and gRPC layers both call into
//! this type.
//!
//! Failure contract:
//! - insert failure is fatal and surfaced; nothing is published without a
//!   persisted row
//! - publish failure marks the row `failed` (best effort) and is surfaced;
//!   the row stays behind for out-of-band reconciliation
//! - status-update failure after a successful publish is logged and
//!   swallowed; the caller still gets success

use crate::error::{RelayError, Result};
use crate::publisher::{OutboundMessage, Publisher};
use crate::store::{MessageStatus, MessageStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Partition key attached to every relayed message
pub const DEFAULT_KEY: &str = "default-key";

/// Status line returned on a successful submission
pub const SUBMIT_OK: &str = "message sent successfully";

/// Outcome of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: i64,
    pub status: &'static str,
}

/// The relay service core
pub struct Relay {
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn Publisher>,
    request_timeout: Duration,
}

impl Relay {
    pub fn new(
        store: Arc<dyn MessageStore>,
        publisher: Arc<dyn Publisher>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            request_timeout,
        }
    }

    /// Persist, publish and record one message
    ///
    /// The whole call shares one deadline; expiry cancels the in-flight
    /// store or publish future. A row that was already created before the
    /// publish step failed (or timed out) is marked `failed` so it is never
    /// left `pending` after this returns.
    pub async fn submit_message(&self, content: &str) -> Result<Submission> {
        let deadline = tokio::time::Instant::now() + self.request_timeout;

        let id = tokio::time::timeout_at(deadline, self.store.insert(content))
            .await
            .map_err(|_| RelayError::Timeout)??;

        let outbound = OutboundMessage {
            id,
            content: content.to_string(),
        };
        let published =
            match tokio::time::timeout_at(deadline, self.publisher.publish(DEFAULT_KEY, &outbound))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(RelayError::Timeout),
            };

        match published {
            Ok(()) => {
                self.mark(id, MessageStatus::Processed).await;
                Ok(Submission {
                    id,
                    status: SUBMIT_OK,
                })
            }
            Err(e) => {
                self.mark(id, MessageStatus::Failed).await;
                Err(e)
            }
        }
    }

    /// Count of messages that reached the `processed` state
    pub async fn processed_count(&self) -> Result<i64> {
        self.store.count_processed().await
    }

    /// Best-effort status bookkeeping; delivery correctness does not depend
    /// on it
    async fn mark(&self, id: i64, status: MessageStatus) {
        if let Err(e) = self.store.update_status(id, status).await {
            warn!(id, %status, error = %e, "Status update failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store fake: rows in a Vec, ids are 1-based positions
    #[derive(Default)]
    struct InMemoryStore {
        rows: Mutex<Vec<(String, MessageStatus)>>,
        fail_inserts: AtomicBool,
        fail_updates: AtomicBool,
    }

    impl InMemoryStore {
        fn status_of(&self, id: i64) -> MessageStatus {
            self.rows.lock()[(id - 1) as usize].1
        }

        fn pending_count(&self) -> usize {
            self.rows
                .lock()
                .iter()
                .filter(|(_, s)| *s == MessageStatus::Pending)
                .count()
        }
    }

    #[async_trait]
    impl MessageStore for InMemoryStore {
        async fn insert(&self, content: &str) -> Result<i64> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(RelayError::Store(sqlx::Error::PoolTimedOut));
            }
            let mut rows = self.rows.lock();
            rows.push((content.to_string(), MessageStatus::Pending));
            Ok(rows.len() as i64)
        }

        async fn update_status(&self, id: i64, status: MessageStatus) -> Result<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(RelayError::Store(sqlx::Error::PoolTimedOut));
            }
            let mut rows = self.rows.lock();
            if let Some(row) = rows.get_mut((id - 1) as usize) {
                row.1 = status;
            }
            Ok(())
        }

        async fn count_processed(&self) -> Result<i64> {
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|(_, s)| *s == MessageStatus::Processed)
                .count() as i64)
        }
    }

    /// Publisher fake recording every delivery
    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, i64)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn publish(&self, key: &str, message: &OutboundMessage) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RelayError::Publish("broker down".to_string()));
            }
            self.published.lock().push((key.to_string(), message.id));
            Ok(())
        }
    }

    /// Publisher fake that never completes
    struct StuckPublisher;

    #[async_trait]
    impl Publisher for StuckPublisher {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn publish(&self, _key: &str, _message: &OutboundMessage) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn make_relay(
        store: Arc<InMemoryStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Relay {
        Relay::new(store, publisher, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_submit_success() {
        let store = Arc::new(InMemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = make_relay(Arc::clone(&store), Arc::clone(&publisher) as Arc<dyn Publisher>);

        let submission = relay.submit_message("hello").await.unwrap();

        assert_eq!(submission.id, 1);
        assert_eq!(submission.status, SUBMIT_OK);
        assert_eq!(store.status_of(1), MessageStatus::Processed);
        assert_eq!(
            publisher.published.lock().as_slice(),
            &[(DEFAULT_KEY.to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_publish_failure_marks_row_failed() {
        let store = Arc::new(InMemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        publisher.fail.store(true, Ordering::SeqCst);
        let relay = make_relay(Arc::clone(&store), Arc::clone(&publisher) as Arc<dyn Publisher>);

        let err = relay.submit_message("hello").await.unwrap_err();

        assert!(matches!(err, RelayError::Publish(_)));
        assert_eq!(store.status_of(1), MessageStatus::Failed);
        // The failed row never counts as processed
        assert_eq!(relay.processed_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_failure_skips_publish() {
        let store = Arc::new(InMemoryStore::default());
        store.fail_inserts.store(true, Ordering::SeqCst);
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = make_relay(Arc::clone(&store), Arc::clone(&publisher) as Arc<dyn Publisher>);

        let err = relay.submit_message("hello").await.unwrap_err();

        assert!(matches!(err, RelayError::Store(_)));
        assert!(publisher.published.lock().is_empty());
    }

    #[tokio::test]
    async fn test_bookkeeping_failure_is_swallowed() {
        let store = Arc::new(InMemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = make_relay(Arc::clone(&store), Arc::clone(&publisher) as Arc<dyn Publisher>);

        // Publish succeeds, only the processed bookkeeping fails
        store.fail_updates.store(true, Ordering::SeqCst);
        let submission = relay.submit_message("hello").await.unwrap();

        assert_eq!(submission.status, SUBMIT_OK);
        assert_eq!(publisher.published.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_publish() {
        let store = Arc::new(InMemoryStore::default());
        let relay = Relay::new(
            Arc::clone(&store) as Arc<dyn MessageStore>,
            Arc::new(StuckPublisher),
            Duration::from_millis(100),
        );

        let err = relay.submit_message("hello").await.unwrap_err();

        assert!(matches!(err, RelayError::Timeout));
        // The created row is not left pending
        assert_eq!(store.status_of(1), MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_row_is_left_pending() {
        let store = Arc::new(InMemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = make_relay(Arc::clone(&store), Arc::clone(&publisher) as Arc<dyn Publisher>);

        relay.submit_message("ok").await.unwrap();
        publisher.fail.store(true, Ordering::SeqCst);
        relay.submit_message("broken").await.unwrap_err();

        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_get_distinct_ids() {
        let store = Arc::new(InMemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = Arc::new(make_relay(
            Arc::clone(&store),
            Arc::clone(&publisher) as Arc<dyn Publisher>,
        ));

        let mut handles = Vec::new();
        for i in 0..16 {
            let relay = Arc::clone(&relay);
            handles.push(tokio::spawn(async move {
                relay.submit_message(&format!("msg-{i}")).await.unwrap().id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 16);
        assert_eq!(relay.processed_count().await.unwrap(), 16);
    }
}
