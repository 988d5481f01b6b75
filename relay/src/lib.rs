//! VIESTI - Message Ingestion Relay
//!
//! A small relay service that accepts messages over HTTP or gRPC, persists
//! them to PostgreSQL and forwards them to a Kafka topic. A background
//! subscriber buffers topic messages in memory for on-demand consumption.
//!
//! # Architecture
//!
//! ```text
//! HTTP / gRPC ──► Relay ──► Store (pending) ──► Publisher ──► Store (processed/failed)
//!
//! Kafka topic ──► Subscriber ──► MessageBuffer ──► GET /api/consume (drain)
//! ```
//!
//! The store and publisher sit behind traits so transports and tests can
//! inject fakes.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod error;
pub mod http;
pub mod publisher;
pub mod relay;
pub mod server;
pub mod store;
pub mod subscriber;

// Re-export proto types
pub mod proto {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::derive_partial_eq_without_eq)]
    include!("proto/viesti.v1.rs");
}

pub use config::Config;
pub use error::{RelayError, Result};
pub use publisher::{OutboundMessage, Publisher};
pub use relay::Relay;
pub use store::{MessageStatus, MessageStore};
pub use subscriber::{MessageBuffer, QueueEntry};
