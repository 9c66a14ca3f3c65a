use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{BigInt, Bool};
use diesel::upsert::excluded;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use duet_shared::clients::db::DbPool;
use duet_shared::errors::{AppError, AppResult, ErrorCode};
use duet_shared::types::event::payloads::ActionSubmitted;

use super::Store;
use crate::models::{
    adjust_behavioral_rating, Filter, FilterRow, NewFilter, NewProfile, NewUserAction, Profile,
    ProfileInput, ProfileRow, ReciprocalPair,
};
use crate::schema::{filters, profiles, user_actions};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    tracing::info!(count = applied.len(), "database migrations applied");
    Ok(())
}

/// Each pair is reported once: canonical ordering (`a.from_user_id <
/// b.from_user_id`) drops the mirrored row, `DISTINCT` folds repeated likes,
/// and a pair that already matched is never reported again.
const RECIPROCAL_LIKES_SQL: &str = "\
    SELECT DISTINCT a.from_user_id AS first_user_id, a.to_user_id AS second_user_id \
    FROM user_actions a \
    JOIN user_actions b \
      ON a.from_user_id = b.to_user_id \
     AND a.to_user_id = b.from_user_id \
    WHERE a.action = 'like' \
      AND b.action = 'like' \
      AND a.was_matched = false \
      AND b.was_matched = false \
      AND a.from_user_id < b.from_user_id \
      AND NOT EXISTS ( \
          SELECT 1 FROM user_actions m \
          WHERE m.action = 'like' \
            AND m.was_matched = true \
            AND ((m.from_user_id = a.from_user_id AND m.to_user_id = a.to_user_id) \
              OR (m.from_user_id = a.to_user_id AND m.to_user_id = a.from_user_id))) \
    ORDER BY first_user_id, second_user_id";

const PAIR_MATCHED_SQL: &str = "\
    SELECT EXISTS ( \
        SELECT 1 FROM user_actions \
        WHERE action = 'like' \
          AND was_matched = true \
          AND ((from_user_id = $1 AND to_user_id = $2) \
            OR (from_user_id = $2 AND to_user_id = $1))) AS matched";

/// Flips every pending like between the two users, both directions.
const CLAIM_PAIR_SQL: &str = "\
    UPDATE user_actions SET was_matched = true \
    WHERE action = 'like' \
      AND was_matched = false \
      AND ((from_user_id = $1 AND to_user_id = $2) \
        OR (from_user_id = $2 AND to_user_id = $1)) \
    RETURNING from_user_id";

#[derive(QueryableByName)]
struct PairMatched {
    #[diesel(sql_type = Bool)]
    matched: bool,
}

#[derive(QueryableByName)]
struct ClaimedLike {
    #[diesel(sql_type = BigInt)]
    from_user_id: i64,
}

fn pair_query(sql: &'static str, pair: &ReciprocalPair) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
    diesel::sql_query(sql)
        .into_boxed()
        .bind::<BigInt, _>(pair.first_user_id)
        .bind::<BigInt, _>(pair.second_user_id)
}

/// Profiles accepted by the filter that the viewer has not acted on yet.
fn candidates_query(viewer_id: i64, filter: &Filter) -> profiles::BoxedQuery<'static, Pg> {
    let judged = user_actions::table
        .filter(user_actions::from_user_id.eq(viewer_id))
        .select(user_actions::to_user_id);

    profiles::table
        .filter(profiles::gender.eq(filter.gender.as_str()))
        .filter(profiles::age.between(filter.min_age, filter.max_age))
        .filter(profiles::user_id.ne(viewer_id))
        .filter(profiles::user_id.ne_all(judged))
        .order((profiles::result_rating.desc(), profiles::user_id.asc()))
        .into_boxed()
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Diesel is synchronous; queries run on the blocking pool.
    async fn run<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| AppError::internal(format!("database task failed: {e}")))?
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> AppResult<()> {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn upsert_profile(&self, input: ProfileInput) -> AppResult<Profile> {
        let row = NewProfile::from(input);
        self.run(move |conn| {
            let saved = diesel::insert_into(profiles::table)
                .values(&row)
                .on_conflict(profiles::user_id)
                .do_update()
                .set((
                    profiles::full_name.eq(excluded(profiles::full_name)),
                    profiles::gender.eq(excluded(profiles::gender)),
                    profiles::age.eq(excluded(profiles::age)),
                    profiles::description.eq(excluded(profiles::description)),
                    profiles::photo.eq(excluded(profiles::photo)),
                    profiles::primary_rating.eq(excluded(profiles::primary_rating)),
                    profiles::updated_at.eq(Utc::now()),
                ))
                .get_result::<ProfileRow>(conn)?;

            tracing::debug!(
                user_id = saved.user_id,
                primary_rating = saved.primary_rating,
                "profile saved"
            );
            Profile::try_from(saved)
        })
        .await
    }

    async fn get_profile(&self, user_id: i64) -> AppResult<Option<Profile>> {
        self.run(move |conn| {
            profiles::table
                .filter(profiles::user_id.eq(user_id))
                .first::<ProfileRow>(conn)
                .optional()?
                .map(Profile::try_from)
                .transpose()
        })
        .await
    }

    async fn upsert_filter(&self, filter: Filter) -> AppResult<Filter> {
        let row = NewFilter::from(&filter);
        self.run(move |conn| {
            let saved = diesel::insert_into(filters::table)
                .values(&row)
                .on_conflict(filters::user_id)
                .do_update()
                .set((
                    filters::gender.eq(excluded(filters::gender)),
                    filters::min_age.eq(excluded(filters::min_age)),
                    filters::max_age.eq(excluded(filters::max_age)),
                    filters::updated_at.eq(Utc::now()),
                ))
                .get_result::<FilterRow>(conn)?;
            Filter::try_from(saved)
        })
        .await
    }

    async fn get_filter(&self, user_id: i64) -> AppResult<Option<Filter>> {
        self.run(move |conn| {
            filters::table
                .filter(filters::user_id.eq(user_id))
                .first::<FilterRow>(conn)
                .optional()?
                .map(Filter::try_from)
                .transpose()
        })
        .await
    }

    async fn record_action(&self, action: &ActionSubmitted) -> AppResult<Profile> {
        let action = action.clone();
        self.run(move |conn| {
            conn.transaction::<_, AppError, _>(|conn| {
                diesel::insert_into(user_actions::table)
                    .values(&NewUserAction::pending(
                        action.from_user_id,
                        action.to_user_id,
                        action.action,
                    ))
                    .execute(conn)?;

                let target = profiles::table
                    .filter(profiles::user_id.eq(action.to_user_id))
                    .for_update()
                    .first::<ProfileRow>(conn)
                    .optional()?
                    .ok_or_else(|| {
                        AppError::new(
                            ErrorCode::ProfileNotFound,
                            format!("no profile for user {}", action.to_user_id),
                        )
                    })?;

                let rating = adjust_behavioral_rating(target.behavioral_rating, action.action);
                let updated = diesel::update(profiles::table.filter(profiles::id.eq(target.id)))
                    .set((
                        profiles::behavioral_rating.eq(rating),
                        profiles::updated_at.eq(Utc::now()),
                    ))
                    .get_result::<ProfileRow>(conn)?;

                Profile::try_from(updated)
            })
        })
        .await
    }

    async fn find_reciprocal_likes(&self) -> AppResult<Vec<ReciprocalPair>> {
        self.run(|conn| Ok(diesel::sql_query(RECIPROCAL_LIKES_SQL).load::<ReciprocalPair>(conn)?))
            .await
    }

    async fn claim_pair(&self, pair: &ReciprocalPair) -> AppResult<bool> {
        let pair = *pair;
        self.run(move |conn| {
            let outcome = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                // Both users' profile rows serialize claims on this pair.
                profiles::table
                    .filter(profiles::user_id.eq_any(vec![pair.first_user_id, pair.second_user_id]))
                    .order(profiles::user_id)
                    .select(profiles::id)
                    .for_update()
                    .load::<i64>(conn)?;

                let already = pair_query(PAIR_MATCHED_SQL, &pair).get_result::<PairMatched>(conn)?;
                if already.matched {
                    return Ok(false);
                }

                let claimed = pair_query(CLAIM_PAIR_SQL, &pair).load::<ClaimedLike>(conn)?;
                let both_sides = [pair.first_user_id, pair.second_user_id]
                    .iter()
                    .all(|user| claimed.iter().any(|row| row.from_user_id == *user));

                // One side was taken back or claimed meanwhile; undo ours.
                if both_sides {
                    Ok(true)
                } else {
                    Err(diesel::result::Error::RollbackTransaction)
                }
            });

            match outcome {
                Ok(claimed) => Ok(claimed),
                Err(diesel::result::Error::RollbackTransaction) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn find_candidates(&self, viewer_id: i64, filter: &Filter) -> AppResult<Vec<Profile>> {
        let filter = *filter;
        self.run(move |conn| {
            candidates_query(viewer_id, &filter)
                .load::<ProfileRow>(conn)?
                .into_iter()
                .map(Profile::try_from)
                .collect()
        })
        .await
    }
}
