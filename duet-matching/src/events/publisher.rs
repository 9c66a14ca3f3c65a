use async_trait::async_trait;

use duet_shared::clients::rabbitmq::RabbitMQClient;
use duet_shared::errors::AppResult;
use duet_shared::types::event::{payloads, routing_keys, Event};

const SOURCE: &str = "duet-matching";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Put a like/dislike on the action topic.
    async fn publish_action(&self, action: &payloads::ActionSubmitted) -> AppResult<()>;

    /// Announce a claimed reciprocal like on the match topic.
    async fn publish_match(&self, matched: &payloads::MatchCreated) -> AppResult<()>;
}

#[async_trait]
impl EventPublisher for RabbitMQClient {
    async fn publish_action(&self, action: &payloads::ActionSubmitted) -> AppResult<()> {
        let event = Event::new(SOURCE, routing_keys::ACTION_SUBMITTED, action.clone())
            .with_user(action.from_user_id);

        self.publish(routing_keys::ACTION_SUBMITTED, &event).await?;
        Ok(())
    }

    async fn publish_match(&self, matched: &payloads::MatchCreated) -> AppResult<()> {
        let event = Event::new(SOURCE, routing_keys::MATCH_CREATED, *matched)
            .with_user(matched.from_user_id);

        self.publish(routing_keys::MATCH_CREATED, &event).await?;
        Ok(())
    }
}
