use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;

use duet_shared::clients::rabbitmq::RabbitMQClient;
use duet_shared::types::event::routing_keys;

use crate::matching::ingestor;
use crate::store::Store;

/// Consume the action topic until the broker closes the consumer.
///
/// Each delivery is acked after one processing attempt, whatever the
/// outcome; failed messages are logged and dropped rather than requeued.
pub async fn listen_actions(
    rabbitmq: RabbitMQClient,
    store: Arc<dyn Store>,
    queue_name: String,
) -> anyhow::Result<()> {
    let mut consumer = rabbitmq
        .subscribe(&queue_name, &[routing_keys::ACTION_SUBMITTED])
        .await?;

    tracing::info!(queue = %queue_name, "listening for action submissions");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let outcome = ingestor::ingest_action(store.as_ref(), &delivery.data).await;
                tracing::trace!(?outcome, "action message handled");

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::error!(error = %e, "failed to ack action message");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "action consumer error");
            }
        }
    }

    tracing::warn!(queue = %queue_name, "action consumer stream ended");
    Ok(())
}
