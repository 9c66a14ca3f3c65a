use redis::aio::ConnectionManager;
use redis::AsyncCommands;

#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Pops the head of a list. `None` when the list is empty or missing.
    pub async fn lpop(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.lpop(key, None).await
    }

    /// Appends all values to the tail of a list in one round-trip, keeping their order.
    pub async fn rpush_all(&self, key: &str, values: &[String]) -> Result<(), redis::RedisError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.rpush(key, values).await
    }

    /// Appends values and refreshes the key's expiry atomically.
    pub async fn rpush_all_with_ttl(
        &self,
        key: &str,
        values: &[String],
        ttl_secs: i64,
    ) -> Result<(), redis::RedisError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .rpush(key, values)
            .ignore()
            .expire(key, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await
    }
}
