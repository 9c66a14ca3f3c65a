use std::pin::Pin;

use async_trait::async_trait;
use futures_lite::{Stream, StreamExt};

use duet_shared::clients::rabbitmq::RabbitMQClient;
use duet_shared::errors::{AppError, AppResult};
use duet_shared::types::event::payloads::MatchCreated;
use duet_shared::types::event::{routing_keys, Event};

/// Raw match-topic messages for a single subscriber.
pub type PayloadStream = Pin<Box<dyn Stream<Item = AppResult<Vec<u8>>> + Send>>;

/// Opens one subscription to the match topic per call. Every subscription
/// sees every match event; dropping the stream releases it.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn open(&self) -> AppResult<PayloadStream>;
}

#[async_trait]
impl MatchSource for RabbitMQClient {
    async fn open(&self) -> AppResult<PayloadStream> {
        let consumer = self
            .subscribe_ephemeral(&[routing_keys::MATCH_CREATED])
            .await?;
        tracing::info!(queue = %consumer.queue_name(), "match subscriber attached");

        Ok(Box::pin(consumer.map(|delivery| {
            delivery.map(|d| d.data).map_err(AppError::from)
        })))
    }
}

/// Decode match messages in delivery order.
///
/// Bad payloads and consumer errors are logged and skipped; the stream ends
/// only when the source does.
pub fn forward_matches<S>(mut payloads: S) -> impl Stream<Item = MatchCreated> + Send
where
    S: Stream<Item = AppResult<Vec<u8>>> + Unpin + Send,
{
    async_stream::stream! {
        while let Some(item) = payloads.next().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, "match consumer error");
                    continue;
                }
            };

            match serde_json::from_slice::<Event<MatchCreated>>(&bytes) {
                Ok(event) => {
                    tracing::debug!(
                        event_id = %event.id,
                        from_user_id = event.data.from_user_id,
                        to_user_id = event.data.to_user_id,
                        "forwarding match"
                    );
                    yield event.data;
                }
                Err(e) => tracing::warn!(error = %e, "skipping undecodable match message"),
            }
        }
        tracing::info!("match source closed");
    }
}
