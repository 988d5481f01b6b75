//! Demo gRPC client for the relay
//!
//! Submits a batch of messages and prints the processed-message count:
//!
//! ```bash
//! cargo run --bin client -- --count 5
//! ```

use clap::Parser;
use tracing::info;
use viesti_relay::proto::message_service_client::MessageServiceClient;
use viesti_relay::proto::{MessageRequest, StatsRequest};

#[derive(Parser, Debug)]
#[command(name = "viesti-client", about = "Send messages to the relay over gRPC")]
struct Args {
    /// Relay gRPC endpoint
    #[arg(
        long,
        env = "VIESTI_GRPC_ENDPOINT",
        default_value = "http://127.0.0.1:50051"
    )]
    endpoint: String,

    /// Number of messages to send
    #[arg(short, long, default_value_t = 1)]
    count: u32,

    /// Message content; the sequence number is appended
    #[arg(short, long, default_value = "Hello from viesti-client")]
    message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut client = MessageServiceClient::connect(args.endpoint.clone()).await?;

    for i in 1..=args.count {
        let content = format!("{} #{i}", args.message);
        let response = client
            .send_message(MessageRequest { content })
            .await?
            .into_inner();
        info!(status = %response.status, id = response.id, "Message accepted");
    }

    let stats = client
        .get_processed_messages(StatsRequest {})
        .await?
        .into_inner();
    info!(processed = stats.processed_count, "Relay stats");

    Ok(())
}
