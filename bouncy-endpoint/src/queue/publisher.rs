//! Async RabbitMQ publisher for feedback records.
//!
//! One connection and channel are shared by every request task and rebuilt
//! on demand after the broker drops them.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::types::{feedback_message_id, FEEDBACK_QUEUE};
use crate::dispatch::FeedbackStore;
use crate::error::StoreError;
use crate::feedback::FeedbackRecord;

/// Async RabbitMQ publisher with connection management.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a publisher for the broker at `url`.
    ///
    /// No connection is made until the first publish.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Return a live channel, reconnecting and redeclaring the feedback
    /// queue if the previous one was lost.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Another task may have reconnected while we waited
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.queue_declare(
            FEEDBACK_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare feedback queue")?;

        info!(queue = FEEDBACK_QUEUE, "rabbitmq_publisher_connected");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish one record to the feedback queue and wait for the broker.
    pub async fn publish_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        let channel = self.ensure_connected().await?;

        let body = serde_json::to_vec(record).context("Failed to serialize feedback record")?;
        let message_id = feedback_message_id(record);

        channel
            .basic_publish(
                "",
                FEEDBACK_QUEUE,
                BasicPublishOptions::default(),
                &body,
                feedback_properties(record, &message_id),
            )
            .await
            .context("Failed to publish to feedback queue")?
            .await
            .context("Failed to confirm publish")?;

        info!(
            queue = FEEDBACK_QUEUE,
            message_id = %message_id,
            body_length = body.len(),
            "rabbitmq_feedback_published"
        );

        Ok(())
    }

    /// Close the channel and connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

#[async_trait]
impl FeedbackStore for Publisher {
    async fn save(&self, record: &FeedbackRecord) -> Result<(), StoreError> {
        self.publish_feedback(record)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{e:#}")))
    }
}

/// Message properties for one record: persistent JSON, typed by record kind.
fn feedback_properties(record: &FeedbackRecord, message_id: &str) -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(2) // Persistent
        .with_content_type("application/json".into())
        .with_type(record.kind().label().into())
        .with_message_id(message_id.into())
}
