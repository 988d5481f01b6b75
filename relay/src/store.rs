//! Message persistence
//!
//! One table, three states. Rows are created `pending`, moved exactly once
//! to `processed` or `failed`, and never deleted by this service.

use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Lifecycle state of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Persisted, publish not yet attempted
    Pending,
    /// Publish acknowledged by the broker
    Processed,
    /// Publish exhausted its retries
    Failed,
}

impl MessageStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Processed => "processed",
            MessageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage seam for the relay
///
/// The relay orchestrates against this trait; production uses
/// [`PgMessageStore`], tests inject in-memory fakes.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message with status `pending`, returning its id
    async fn insert(&self, content: &str) -> Result<i64>;

    /// Set the status of an existing row
    ///
    /// An absent id is a no-op, not an error.
    async fn update_status(&self, id: i64, status: MessageStatus) -> Result<()>;

    /// Count rows with status `processed`
    async fn count_processed(&self) -> Result<i64>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id      BIGSERIAL PRIMARY KEY,
    content TEXT NOT NULL,
    status  TEXT NOT NULL DEFAULT 'pending'
);
"#;

/// PostgreSQL-backed message store
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    /// Connect to PostgreSQL and apply the schema
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        info!("Connected to PostgreSQL, schema applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by tests against a prepared database)
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close the underlying pool, waiting for checked-out connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, content: &str) -> Result<i64> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO messages (content, status) VALUES ($1, $2) RETURNING id")
                .bind(content)
                .bind(MessageStatus::Pending.as_str())
                .fetch_one(&self.pool)
                .await?;

        debug!(id, "Message row inserted");
        Ok(id)
    }

    async fn update_status(&self, id: i64, status: MessageStatus) -> Result<()> {
        let result = sqlx::query("UPDATE messages SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(id, %status, "Status update matched no row");
        }
        Ok(())
    }

    async fn count_processed(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE status = $1")
            .bind(MessageStatus::Processed.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
