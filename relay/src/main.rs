//! VIESTI Relay - message ingestion service
//!
//! Accepts messages over HTTP and gRPC, persists them to PostgreSQL and
//! forwards them to a Kafka topic. A background subscriber buffers topic
//! messages for `GET /api/consume`.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! cargo run
//!
//! # Run with debug output
//! RUST_LOG=debug cargo run
//! ```
//!
//! ## Environment Variables
//!
//! - `VIESTI_HTTP_ADDR`: HTTP API address (default: "0.0.0.0:8080")
//! - `VIESTI_GRPC_ADDR`: gRPC server address (default: "0.0.0.0:50051")
//! - `DATABASE_URL`: PostgreSQL connection string
//! - `KAFKA_BROKERS`: bootstrap broker list (default: "localhost:9092")
//! - `KAFKA_TOPIC`: relay topic (default: "messages")
//! - `KAFKA_GROUP_ID`: subscriber consumer group (default: "viesti-relay")

use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viesti_relay::config::Config;
use viesti_relay::http::{self, AppState};
use viesti_relay::publisher::{self, KafkaPublisher, Publisher};
use viesti_relay::relay::Relay;
use viesti_relay::server::RelayService;
use viesti_relay::store::PgMessageStore;
use viesti_relay::subscriber::Subscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        http_addr = %config.http_addr,
        grpc_addr = %config.grpc_addr,
        brokers = %config.kafka_brokers,
        topic = %config.kafka_topic,
        "Starting VIESTI relay"
    );

    // Storage and broker setup
    let store = PgMessageStore::connect(&config.database_url).await?;
    publisher::ensure_topic(&config).await?;
    let kafka = Arc::new(KafkaPublisher::new(&config)?);

    // Buffered subscriber: one long-lived read loop for the process lifetime
    let subscriber = Subscriber::new(&config)?;
    let buffer = subscriber.buffer();
    let cancel = CancellationToken::new();
    let subscriber_task = tokio::spawn(subscriber.run(cancel.clone()));

    let relay = Arc::new(Relay::new(
        Arc::new(store.clone()),
        kafka.clone(),
        config.request_timeout,
    ));

    // gRPC server
    let grpc_addr = config.grpc_addr;
    let grpc_service = RelayService::new(Arc::clone(&relay));
    let grpc_cancel = cancel.clone();
    let grpc_task = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(grpc_service.into_server())
            .serve_with_shutdown(grpc_addr, grpc_cancel.cancelled_owned())
            .await
    });
    info!(%grpc_addr, "gRPC server listening");

    // HTTP server on the main task; the shutdown future doubles as the
    // signal handler and cancels everything else
    let state = AppState {
        relay,
        buffer,
    };
    let shutdown_cancel = cancel.clone();
    http::serve(config.http_addr, state, async move {
        shutdown_signal().await;
        shutdown_cancel.cancel();
    })
    .await?;

    // Drain background tasks before exit
    subscriber_task.await?;
    grpc_task.await??;
    kafka.shutdown().await?;
    store.close().await;

    info!("VIESTI relay shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
