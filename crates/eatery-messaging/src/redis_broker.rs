//! Redis Streams broker.
//!
//! Each topic is a stream. A message becomes one stream entry:
//!
//! ```text
//! XADD <topic> * id <id> name <name> data <bytes> metadata <json>
//! ```
//!
//! Consumers deduplicate on the `id` field; the broker may deliver an entry
//! more than once.

use async_trait::async_trait;
use eatery_core::error::DomainError;
use eatery_core::message::{Message, MessagePublisher};
use redis::aio::MultiplexedConnection;
use tracing::instrument;

/// [`MessagePublisher`] backed by Redis Streams.
#[derive(Clone)]
pub struct RedisStreamBroker {
    conn: MultiplexedConnection,
}

impl RedisStreamBroker {
    /// Connects to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transient` if the URL is invalid or the server
    /// is unreachable.
    #[instrument(skip_all, err)]
    pub async fn connect(redis_url: &str) -> Result<Self, DomainError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| DomainError::Transient(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| DomainError::Transient(format!("redis connection failed: {e}")))?;
        tracing::info!("connected to redis");
        Ok(Self { conn })
    }
}

/// Builds the XADD command for `message` on `topic`.
fn xadd(topic: &str, message: &Message) -> redis::Cmd {
    let metadata = serde_json::Value::Object(message.metadata.clone()).to_string();
    let mut cmd = redis::cmd("XADD");
    cmd.arg(topic)
        .arg("*")
        .arg("id")
        .arg(&message.id)
        .arg("name")
        .arg(&message.name)
        .arg("data")
        .arg(&message.data[..])
        .arg("metadata")
        .arg(metadata);
    cmd
}

#[async_trait]
impl MessagePublisher for RedisStreamBroker {
    #[instrument(skip_all, fields(topic = %topic, message_id = %message.id), err)]
    async fn publish(&self, topic: &str, message: &Message) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let entry_id: String = xadd(topic, message)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::Transient(format!("XADD failed: {e}")))?;
        tracing::debug!(entry_id = %entry_id, "published to stream");
        Ok(())
    }
}
