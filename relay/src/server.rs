//! gRPC server
//!
//! Implements `viesti.v1.MessageService`, the RPC twin of the HTTP API.
//! Both transports delegate to the same [`Relay`], so the semantics are
//! identical; only the wire types differ.

use crate::proto::message_service_server::{MessageService, MessageServiceServer};
use crate::proto::{MessageRequest, MessageResponse, MessageStats, StatsRequest};
use crate::relay::Relay;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::debug;

/// gRPC service implementation
pub struct RelayService {
    relay: Arc<Relay>,
}

impl RelayService {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Create a tonic server from this service
    pub fn into_server(self) -> MessageServiceServer<Self> {
        MessageServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl MessageService for RelayService {
    async fn send_message(
        &self,
        request: Request<MessageRequest>,
    ) -> Result<Response<MessageResponse>, Status> {
        let content = request.into_inner().content;
        debug!(bytes = content.len(), "SendMessage received");

        let submission = self.relay.submit_message(&content).await?;

        Ok(Response::new(MessageResponse {
            status: submission.status.to_string(),
            id: submission.id,
        }))
    }

    async fn get_processed_messages(
        &self,
        _request: Request<StatsRequest>,
    ) -> Result<Response<MessageStats>, Status> {
        let count = self.relay.processed_count().await?;

        Ok(Response::new(MessageStats {
            processed_count: count,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::publisher::{OutboundMessage, Publisher};
    use crate::store::{MessageStatus, MessageStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct StubStore {
        next_id: AtomicI64,
        processed: AtomicI64,
    }

    #[async_trait]
    impl MessageStore for StubStore {
        async fn insert(&self, _content: &str) -> crate::error::Result<i64> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn update_status(&self, _id: i64, status: MessageStatus) -> crate::error::Result<()> {
            if status == MessageStatus::Processed {
                self.processed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn count_processed(&self) -> crate::error::Result<i64> {
            Ok(self.processed.load(Ordering::SeqCst))
        }
    }

    #[derive(Default)]
    struct StubPublisher {
        fail: AtomicBool,
    }

    #[async_trait]
    impl Publisher for StubPublisher {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn publish(&self, _key: &str, _message: &OutboundMessage) -> crate::error::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RelayError::Publish("broker down".to_string()));
            }
            Ok(())
        }
    }

    fn make_service(publisher: Arc<StubPublisher>) -> RelayService {
        let relay = Relay::new(
            Arc::new(StubStore::default()),
            publisher,
            Duration::from_secs(5),
        );
        RelayService::new(Arc::new(relay))
    }

    #[tokio::test]
    async fn test_send_message() {
        let service = make_service(Arc::new(StubPublisher::default()));

        let response = service
            .send_message(Request::new(MessageRequest {
                content: "hello".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.status, "message sent successfully");
        assert_eq!(response.id, 1);

        let stats = service
            .get_processed_messages(Request::new(StatsRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(stats.processed_count, 1);
    }

    #[tokio::test]
    async fn test_send_message_broker_down() {
        let publisher = Arc::new(StubPublisher::default());
        publisher.fail.store(true, Ordering::SeqCst);
        let service = make_service(Arc::clone(&publisher));

        let status = service
            .send_message(Request::new(MessageRequest {
                content: "hello".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);

        // The failed submission never shows up in the stats
        let stats = service
            .get_processed_messages(Request::new(StatsRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(stats.processed_count, 0);
    }
}
