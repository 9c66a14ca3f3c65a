use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod events;
pub mod matching;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

#[cfg(test)]
mod testing;

use events::publisher::EventPublisher;
use events::relay::MatchSource;
use matching::recommendations::RecommendationService;
use routes::{actions, filters, health, matches, profiles, recommendations};
use store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub recommendations: RecommendationService,
    pub publisher: Arc<dyn EventPublisher>,
    pub matches: Arc<dyn MatchSource>,
    /// `None` when no Prometheus recorder is installed.
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route(
            "/profiles/:user_id",
            put(profiles::upsert_profile).get(profiles::get_profile),
        )
        .route(
            "/filters/:user_id",
            put(filters::upsert_filter).get(filters::get_filter),
        )
        .route("/actions", post(actions::submit_action))
        .route(
            "/recommendations/:viewer_id",
            get(recommendations::get_recommendation),
        )
        .route("/matches/stream", get(matches::stream_matches))
        .layer(axum::middleware::from_fn(
            duet_shared::middleware::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
