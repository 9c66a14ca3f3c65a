//! Durable state: profiles, filters and the user action log.

use async_trait::async_trait;

use duet_shared::errors::AppResult;
use duet_shared::types::event::payloads::ActionSubmitted;

use crate::models::{Filter, Profile, ProfileInput, ReciprocalPair};

mod postgres;

pub use postgres::{run_migrations, PgStore};

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    /// Insert or replace the profile keyed by `user_id`. The primary rating is
    /// recomputed; the behavioral rating of an existing profile is kept.
    async fn upsert_profile(&self, input: ProfileInput) -> AppResult<Profile>;

    async fn get_profile(&self, user_id: i64) -> AppResult<Option<Profile>>;

    async fn upsert_filter(&self, filter: Filter) -> AppResult<Filter>;

    async fn get_filter(&self, user_id: i64) -> AppResult<Option<Filter>>;

    /// Append a pending action row and apply its rating step to the target,
    /// in one transaction. Fails with `ProfileNotFound` and commits nothing
    /// when the target has no profile.
    async fn record_action(&self, action: &ActionSubmitted) -> AppResult<Profile>;

    /// User pairs with pending likes in both directions that have never
    /// matched, each pair reported once however many likes it holds.
    async fn find_reciprocal_likes(&self) -> AppResult<Vec<ReciprocalPair>>;

    /// Flip every pending like between the two users to matched. Succeeds
    /// only when the pair has not matched before and both directions had a
    /// pending like; otherwise nothing changes and `false` is returned.
    async fn claim_pair(&self, pair: &ReciprocalPair) -> AppResult<bool>;

    /// Profiles accepted by `filter`, minus the viewer and anyone the viewer
    /// has already acted on. Ordered by result rating, best first.
    async fn find_candidates(&self, viewer_id: i64, filter: &Filter) -> AppResult<Vec<Profile>>;
}
