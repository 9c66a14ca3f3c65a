pub mod publisher;
pub mod relay;
pub mod subscriber;

use duet_shared::clients::rabbitmq::RabbitMQClient;
use duet_shared::types::event::routing_keys;

/// Provision the action topic's durable queue. Idempotent: redeclaring
/// existing bindings is not an error. The match topic needs no standing
/// queue; every stream subscriber binds its own.
pub async fn declare_topics(rabbitmq: &RabbitMQClient, action_queue: &str) -> Result<(), lapin::Error> {
    rabbitmq
        .declare_queue(action_queue, &[routing_keys::ACTION_SUBMITTED])
        .await
}
