//! Error types for VIESTI

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Store connection or query failure
    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    /// Broker send exhausted its retry budget
    #[error("publish failed: {0}")]
    Publish(String),

    /// Broker client error (connection, admin, flush)
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Malformed inbound payload
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization failure
    #[error("encode error: {0}")]
    Encode(String),

    /// Request deadline expired before the relay finished
    #[error("request timed out")]
    Timeout,

    /// gRPC transport error
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RelayError> for tonic::Status {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Config(msg) => tonic::Status::invalid_argument(msg),
            RelayError::Store(e) => tonic::Status::unavailable(format!("store: {e}")),
            RelayError::Publish(msg) => tonic::Status::internal(format!("publish: {msg}")),
            RelayError::Kafka(e) => tonic::Status::unavailable(format!("kafka: {e}")),
            RelayError::Decode(msg) => tonic::Status::invalid_argument(msg),
            RelayError::Encode(msg) => tonic::Status::internal(msg),
            RelayError::Timeout => tonic::Status::deadline_exceeded("request timed out"),
            RelayError::Transport(e) => tonic::Status::unavailable(e.to_string()),
            RelayError::Io(e) => tonic::Status::internal(e.to_string()),
        }
    }
}

impl RelayError {
    /// HTTP status for this error
    ///
    /// Decode failures are the caller's; store and publish failures are
    /// server errors.
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            RelayError::Decode(_) => StatusCode::BAD_REQUEST,
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_to_grpc_status() {
        let err = RelayError::Publish("all 3 attempts failed".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[test]
    fn test_store_error_to_grpc_status() {
        let err = RelayError::Store(sqlx::Error::PoolTimedOut);
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_decode_error_is_client_error() {
        let err = RelayError::Decode("not json".to_string());
        assert_eq!(err.http_status(), axum::http::StatusCode::BAD_REQUEST);

        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_store_error_is_server_error() {
        let err = RelayError::Store(sqlx::Error::PoolTimedOut);
        assert_eq!(
            err.http_status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
