use async_trait::async_trait;

use duet_shared::clients::redis::RedisClient;
use duet_shared::errors::AppResult;

const QUEUE_PREFIX: &str = "recommendations";

pub fn queue_key(viewer_id: i64) -> String {
    format!("{QUEUE_PREFIX}:{viewer_id}")
}

/// Per-viewer FIFO of serialized profile snapshots.
///
/// Entries are expendable: losing them only costs a refill, and the queue
/// makes no promise against duplicates when two refills race.
#[async_trait]
pub trait RecommendationQueue: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    /// Remove and return the head entry, `None` when the queue is empty.
    async fn pop(&self, viewer_id: i64) -> AppResult<Option<String>>;

    /// Append entries in order.
    async fn push_all(&self, viewer_id: i64, entries: &[String]) -> AppResult<()>;
}

#[derive(Clone)]
pub struct RedisRecommendationQueue {
    redis: RedisClient,
    ttl_secs: u64,
}

impl RedisRecommendationQueue {
    /// `ttl_secs == 0` disables expiry.
    pub fn new(redis: RedisClient, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }
}

#[async_trait]
impl RecommendationQueue for RedisRecommendationQueue {
    async fn ping(&self) -> AppResult<()> {
        Ok(self.redis.ping().await?)
    }

    async fn pop(&self, viewer_id: i64) -> AppResult<Option<String>> {
        Ok(self.redis.lpop(&queue_key(viewer_id)).await?)
    }

    async fn push_all(&self, viewer_id: i64, entries: &[String]) -> AppResult<()> {
        let key = queue_key(viewer_id);
        if self.ttl_secs == 0 {
            self.redis.rpush_all(&key, entries).await?;
        } else {
            let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
            self.redis.rpush_all_with_ttl(&key, entries, ttl).await?;
        }
        Ok(())
    }
}
