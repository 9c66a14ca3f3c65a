use std::pin::Pin;
use std::task::{Context, Poll};

use futures_lite::Stream;
use lapin::{
    message::Delivery, options::*, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties, Consumer,
};
use serde::Serialize;
use std::sync::Arc;

use crate::types::Event;

const EXCHANGE_NAME: &str = "duet.events";

#[derive(Clone)]
pub struct RabbitMQClient {
    connection: Arc<Connection>,
    channel: Channel,
}

impl RabbitMQClient {
    pub async fn connect(url: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        declare_exchange(&channel).await?;

        tracing::info!(url = %url, "connected to RabbitMQ");
        Ok(Self {
            connection: Arc::new(conn),
            channel,
        })
    }

    /// Publish an event with a routing key
    pub async fn publish<T: Serialize>(
        &self,
        routing_key: &str,
        event: &Event<T>,
    ) -> Result<(), lapin::Error> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to serialize event");
                lapin::Error::IOError(Arc::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e,
                )))
            })?;

        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // persistent
            )
            .await?
            .await?;

        tracing::debug!(
            routing_key = %routing_key,
            event_id = %event.id,
            "event published"
        );

        Ok(())
    }

    /// Declare a durable queue and bind it to routing keys without consuming.
    /// Safe to call repeatedly; redeclaring an identical queue is a no-op.
    pub async fn declare_queue(
        &self,
        queue_name: &str,
        routing_keys: &[&str],
    ) -> Result<(), lapin::Error> {
        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        for key in routing_keys {
            self.channel
                .queue_bind(
                    queue_name,
                    EXCHANGE_NAME,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        tracing::info!(queue = %queue_name, bindings = ?routing_keys, "queue declared");
        Ok(())
    }

    /// Declare a durable queue, bind it to routing keys and start consuming.
    /// Every consumer of the same queue shares its messages.
    pub async fn subscribe(
        &self,
        queue_name: &str,
        routing_keys: &[&str],
    ) -> Result<Consumer, lapin::Error> {
        self.declare_queue(queue_name, routing_keys).await?;

        let consumer = self.channel
            .basic_consume(
                queue_name,
                &format!("{queue_name}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue = %queue_name, "subscribed to RabbitMQ queue");

        Ok(consumer)
    }

    /// Open a private, server-named queue on its own channel so this
    /// subscriber receives every message for the routing keys.
    ///
    /// The queue lives only as long as the returned consumer: dropping it
    /// closes the channel and the broker deletes the queue.
    pub async fn subscribe_ephemeral(
        &self,
        routing_keys: &[&str],
    ) -> Result<EphemeralConsumer, lapin::Error> {
        let channel = self.connection.create_channel().await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue_name = queue.name().as_str().to_string();

        for key in routing_keys {
            channel
                .queue_bind(
                    &queue_name,
                    EXCHANGE_NAME,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let consumer = channel
            .basic_consume(
                &queue_name,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::debug!(queue = %queue_name, bindings = ?routing_keys, "ephemeral subscription opened");

        Ok(EphemeralConsumer {
            channel,
            consumer,
            queue_name,
        })
    }
}

async fn declare_exchange(channel: &Channel) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            EXCHANGE_NAME,
            lapin::ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
}

/// Consumer bound to a private queue. Yields deliveries like a regular
/// [`Consumer`] and tears the queue down when dropped.
pub struct EphemeralConsumer {
    channel: Channel,
    consumer: Consumer,
    queue_name: String,
}

impl EphemeralConsumer {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

impl Stream for EphemeralConsumer {
    type Item = Result<Delivery, lapin::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.consumer).poll_next(cx)
    }
}

impl Drop for EphemeralConsumer {
    fn drop(&mut self) {
        let channel = self.channel.clone();
        let queue = std::mem::take(&mut self.queue_name);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                match channel.close(200, "subscriber gone").await {
                    Ok(()) => tracing::debug!(queue = %queue, "ephemeral subscription closed"),
                    Err(e) => tracing::warn!(error = %e, queue = %queue, "failed to close ephemeral channel"),
                }
            });
        }
    }
}
