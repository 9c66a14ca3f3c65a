use std::sync::Arc;

use duet_matching::config::AppConfig;
use duet_matching::events::{self, publisher::EventPublisher, relay::MatchSource, subscriber};
use duet_matching::matching::detector;
use duet_matching::matching::queue::RedisRecommendationQueue;
use duet_matching::matching::recommendations::RecommendationService;
use duet_matching::store::{self, PgStore, Store};
use duet_matching::AppState;
use duet_shared::clients::db;
use duet_shared::clients::rabbitmq::RabbitMQClient;
use duet_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    duet_shared::middleware::init_tracing("duet-matching");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = match duet_shared::middleware::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed, /metrics disabled");
            None
        }
    };

    // Database pool and schema
    let pool = db::create_pool(&config.database_url, config.db_pool_size)?;
    {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || store::run_migrations(&pool)).await??;
    }
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    // Infrastructure clients
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    events::declare_topics(&rabbitmq, &config.action_queue).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;

    let queue = Arc::new(RedisRecommendationQueue::new(
        redis,
        config.recommendation_queue_ttl_secs,
    ));
    let publisher: Arc<dyn EventPublisher> = Arc::new(rabbitmq.clone());
    let matches: Arc<dyn MatchSource> = Arc::new(rabbitmq.clone());

    // Action ingestor
    {
        let rabbitmq = rabbitmq.clone();
        let store = store.clone();
        let queue_name = config.action_queue.clone();
        tokio::spawn(async move {
            if let Err(e) = subscriber::listen_actions(rabbitmq, store, queue_name).await {
                tracing::error!(error = %e, "action ingestor stopped");
            }
        });
    }

    // Match detector
    detector::spawn_match_detector(
        store.clone(),
        publisher.clone(),
        config.match_scan_interval(),
    );

    let state = Arc::new(AppState {
        recommendations: RecommendationService::new(store.clone(), queue),
        store,
        publisher,
        matches,
        metrics_handle,
    });

    let app = duet_matching::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "duet-matching starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
