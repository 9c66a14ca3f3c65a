use std::sync::Arc;

use metrics::counter;

use duet_shared::errors::{AppError, AppResult, ErrorCode};

use crate::matching::queue::RecommendationQueue;
use crate::models::Profile;
use crate::store::Store;

/// Serves one recommendation at a time from a per-viewer queue, refilling it
/// from the store when it runs dry.
///
/// A filled queue is not purged when the viewer later acts on someone in it:
/// judged candidates drop out at the next refill, not before.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn Store>,
    queue: Arc<dyn RecommendationQueue>,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn RecommendationQueue>) -> Self {
        Self { store, queue }
    }

    pub async fn ping_cache(&self) -> AppResult<()> {
        self.queue.ping().await
    }

    pub async fn get_recommendation(&self, viewer_id: i64) -> AppResult<Profile> {
        if let Some(profile) = self.pop_decoded(viewer_id).await? {
            counter!("recommendations_served_total", "source" => "cache").increment(1);
            return Ok(profile);
        }

        let filter = self.store.get_filter(viewer_id).await?.ok_or_else(|| {
            AppError::new(
                ErrorCode::FilterNotFound,
                format!("filter required for user {viewer_id}"),
            )
        })?;

        let candidates = self.store.find_candidates(viewer_id, &filter).await?;
        if candidates.is_empty() {
            return Err(AppError::new(
                ErrorCode::NoRecommendations,
                format!("no recommendations for user {viewer_id}"),
            ));
        }

        let entries = candidates
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::internal(format!("failed to encode profile: {e}")))?;
        self.queue.push_all(viewer_id, &entries).await?;

        counter!("recommendation_refills_total").increment(1);
        tracing::debug!(viewer_id, count = entries.len(), "recommendation queue refilled");

        // A concurrent request may have drained the fresh entries already.
        let profile = match self.pop_decoded(viewer_id).await? {
            Some(profile) => profile,
            None => {
                tracing::debug!(viewer_id, "refilled queue drained concurrently");
                candidates.into_iter().next().ok_or_else(|| {
                    AppError::new(ErrorCode::NoRecommendations, "no recommendations")
                })?
            }
        };

        counter!("recommendations_served_total", "source" => "store").increment(1);
        Ok(profile)
    }

    /// Pop until an entry decodes. Undecodable entries are discarded.
    async fn pop_decoded(&self, viewer_id: i64) -> AppResult<Option<Profile>> {
        while let Some(entry) = self.queue.pop(viewer_id).await? {
            match serde_json::from_str::<Profile>(&entry) {
                Ok(profile) => return Ok(Some(profile)),
                Err(e) => {
                    tracing::warn!(viewer_id, error = %e, "discarding undecodable queue entry");
                }
            }
        }
        Ok(None)
    }
}
