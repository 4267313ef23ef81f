use anyhow::{Result, anyhow};
use lapin::message::Delivery;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, options::*, types::FieldTable,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ at {}", url);
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        info!("Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    /// Resolve a queue without creating it. The worker uses this as its
    /// startup check: a missing queue closes the channel with a 404.
    pub async fn ensure_queue(&self, queue: &str) -> Result<u32> {
        let channel = self.channel.lock().await;

        let state = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Queue '{}' not found: {}", queue, e))?;

        Ok(state.message_count())
    }

    /// Pull up to `max` messages off the queue. One call may return zero
    /// or more deliveries; each stays unacked until the caller settles it.
    pub async fn receive(&self, queue: &str, max: usize) -> Result<Vec<Delivery>, lapin::Error> {
        let channel = self.channel.lock().await;

        let mut deliveries = Vec::new();
        while deliveries.len() < max {
            match channel.basic_get(queue, BasicGetOptions::default()).await? {
                Some(message) => deliveries.push(message.delivery),
                None => break,
            }
        }

        Ok(deliveries)
    }

    /// A dedicated channel for one batch sender.
    pub async fn batch_channel(&self) -> Result<Channel> {
        let conn = self.conn.lock().await;
        Ok(conn.create_channel().await?)
    }

    async fn publish_internal(&self, exchange: &str, payload: &[u8]) -> Result<()> {
        let channel = self.channel.lock().await;

        channel
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        Ok(())
    }

    /// Publish onto a fanout exchange, reconnecting once on failure.
    pub async fn publish(&self, exchange: &str, payload: &[u8]) -> Result<()> {
        if let Err(e) = self.publish_internal(exchange, payload).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(exchange, payload).await?;
        }

        Ok(())
    }
}
