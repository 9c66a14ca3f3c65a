//! In-memory doubles of the store, the recommendation queue and the bus,
//! plus a router harness built on them.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use duet_shared::errors::{AppError, AppResult, ErrorCode};
use duet_shared::types::event::payloads::{ActionKind, ActionSubmitted, MatchCreated};
use duet_shared::types::event::{routing_keys, Event};

use crate::events::publisher::EventPublisher;
use crate::events::relay::{MatchSource, PayloadStream};
use crate::matching::queue::RecommendationQueue;
use crate::matching::recommendations::RecommendationService;
use crate::models::{
    adjust_behavioral_rating, primary_rating, result_rating, Filter, Gender, Profile, ProfileInput,
    ReciprocalPair,
};
use crate::store::Store;
use crate::AppState;

pub fn profile_input(user_id: i64, gender: Gender, age: i32) -> ProfileInput {
    ProfileInput {
        user_id,
        full_name: format!("User {user_id}"),
        gender,
        age,
        description: None,
        photo: None,
    }
}

pub fn action_message(from_user_id: i64, to_user_id: i64, action: ActionKind) -> Vec<u8> {
    let event = Event::new(
        "test",
        routing_keys::ACTION_SUBMITTED,
        ActionSubmitted { from_user_id, to_user_id, action },
    );
    serde_json::to_vec(&event).unwrap()
}

pub fn match_message(from_user_id: i64, to_user_id: i64) -> Vec<u8> {
    let event = Event::new(
        "test",
        routing_keys::MATCH_CREATED,
        MatchCreated { from_user_id, to_user_id },
    );
    serde_json::to_vec(&event).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAction {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub action: ActionKind,
    pub was_matched: bool,
}

#[derive(Default)]
struct State {
    profiles: HashMap<i64, Profile>,
    filters: HashMap<i64, Filter>,
    actions: Vec<StoredAction>,
}

impl State {
    fn pair_matched(actions: &[StoredAction], first: i64, second: i64) -> bool {
        actions.iter().any(|a| {
            a.action == ActionKind::Like
                && a.was_matched
                && ((a.from_user_id == first && a.to_user_id == second)
                    || (a.from_user_id == second && a.to_user_id == first))
        })
    }
}

impl Filter {
    fn accepts(&self, profile: &Profile) -> bool {
        profile.gender == self.gender && (self.min_age..=self.max_age).contains(&profile.age)
    }
}

/// Store double with the same commit rules as the Postgres store: every
/// operation applies fully under one lock or not at all.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn actions(&self) -> Vec<StoredAction> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> AppResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::internal("store unavailable"));
        }
        Ok(())
    }

    fn check_write(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::internal("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        self.check_read()
    }

    async fn upsert_profile(&self, input: ProfileInput) -> AppResult<Profile> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let behavioral_rating = state
            .profiles
            .get(&input.user_id)
            .map_or(0, |p| p.behavioral_rating);
        let primary_rating = primary_rating(input.description.as_deref(), input.photo.as_deref());
        let profile = Profile {
            user_id: input.user_id,
            full_name: input.full_name,
            gender: input.gender,
            age: input.age,
            description: input.description,
            photo: input.photo,
            primary_rating,
            behavioral_rating,
            result_rating: result_rating(primary_rating, behavioral_rating),
        };
        state.profiles.insert(profile.user_id, profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, user_id: i64) -> AppResult<Option<Profile>> {
        self.check_read()?;
        Ok(self.state.lock().unwrap().profiles.get(&user_id).cloned())
    }

    async fn upsert_filter(&self, filter: Filter) -> AppResult<Filter> {
        self.check_write()?;
        self.state.lock().unwrap().filters.insert(filter.user_id, filter);
        Ok(filter)
    }

    async fn get_filter(&self, user_id: i64) -> AppResult<Option<Filter>> {
        self.check_read()?;
        Ok(self.state.lock().unwrap().filters.get(&user_id).copied())
    }

    async fn record_action(&self, action: &ActionSubmitted) -> AppResult<Profile> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let target = state.profiles.get_mut(&action.to_user_id).ok_or_else(|| {
            AppError::new(ErrorCode::ProfileNotFound, format!("no profile for user {}", action.to_user_id))
        })?;
        target.behavioral_rating = adjust_behavioral_rating(target.behavioral_rating, action.action);
        target.result_rating = result_rating(target.primary_rating, target.behavioral_rating);
        let updated = target.clone();

        let id = state.actions.len() as i64 + 1;
        state.actions.push(StoredAction {
            id,
            from_user_id: action.from_user_id,
            to_user_id: action.to_user_id,
            action: action.action,
            was_matched: false,
        });
        Ok(updated)
    }

    async fn find_reciprocal_likes(&self) -> AppResult<Vec<ReciprocalPair>> {
        self.check_read()?;
        let state = self.state.lock().unwrap();
        let pending = |a: &&StoredAction| a.action == ActionKind::Like && !a.was_matched;

        let mut pairs = BTreeSet::new();
        for a in state.actions.iter().filter(pending) {
            for b in state.actions.iter().filter(pending) {
                if a.from_user_id == b.to_user_id
                    && a.to_user_id == b.from_user_id
                    && a.from_user_id < b.from_user_id
                    && !State::pair_matched(&state.actions, a.from_user_id, a.to_user_id)
                {
                    pairs.insert((a.from_user_id, a.to_user_id));
                }
            }
        }
        Ok(pairs
            .into_iter()
            .map(|(first_user_id, second_user_id)| ReciprocalPair { first_user_id, second_user_id })
            .collect())
    }

    async fn claim_pair(&self, pair: &ReciprocalPair) -> AppResult<bool> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let (first, second) = (pair.first_user_id, pair.second_user_id);
        if State::pair_matched(&state.actions, first, second) {
            return Ok(false);
        }

        let pending = |a: &StoredAction, from: i64, to: i64| {
            a.action == ActionKind::Like && !a.was_matched && a.from_user_id == from && a.to_user_id == to
        };
        let both_sides = state.actions.iter().any(|a| pending(a, first, second))
            && state.actions.iter().any(|a| pending(a, second, first));
        if !both_sides {
            return Ok(false);
        }

        for action in state.actions.iter_mut() {
            if pending(&*action, first, second) || pending(&*action, second, first) {
                action.was_matched = true;
            }
        }
        Ok(true)
    }

    async fn find_candidates(&self, viewer_id: i64, filter: &Filter) -> AppResult<Vec<Profile>> {
        self.check_read()?;
        let state = self.state.lock().unwrap();
        let judged: HashSet<i64> = state
            .actions
            .iter()
            .filter(|a| a.from_user_id == viewer_id)
            .map(|a| a.to_user_id)
            .collect();

        let mut candidates: Vec<Profile> = state
            .profiles
            .values()
            .filter(|p| p.user_id != viewer_id && !judged.contains(&p.user_id) && filter.accepts(p))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.result_rating
                .cmp(&a.result_rating)
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(candidates)
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<i64, VecDeque<String>>>,
}

impl MemoryQueue {
    pub fn len(&self, viewer_id: i64) -> usize {
        self.queues.lock().unwrap().get(&viewer_id).map_or(0, VecDeque::len)
    }

    pub fn clear(&self, viewer_id: i64) {
        self.queues.lock().unwrap().remove(&viewer_id);
    }
}

#[async_trait]
impl RecommendationQueue for MemoryQueue {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn pop(&self, viewer_id: i64) -> AppResult<Option<String>> {
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get_mut(&viewer_id)
            .and_then(VecDeque::pop_front))
    }

    async fn push_all(&self, viewer_id: i64, entries: &[String]) -> AppResult<()> {
        self.queues
            .lock()
            .unwrap()
            .entry(viewer_id)
            .or_default()
            .extend(entries.iter().cloned());
        Ok(())
    }
}

/// Publisher double that records what it was asked to send.
#[derive(Default)]
pub struct RecordingPublisher {
    fail: bool,
    actions: Mutex<Vec<ActionSubmitted>>,
    matches: Mutex<Vec<MatchCreated>>,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn actions(&self) -> Vec<ActionSubmitted> {
        self.actions.lock().unwrap().clone()
    }

    pub fn matches(&self) -> Vec<MatchCreated> {
        self.matches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_action(&self, action: &ActionSubmitted) -> AppResult<()> {
        if self.fail {
            return Err(AppError::new(ErrorCode::ServiceUnavailable, "bus unavailable"));
        }
        self.actions.lock().unwrap().push(action.clone());
        Ok(())
    }

    async fn publish_match(&self, matched: &MatchCreated) -> AppResult<()> {
        if self.fail {
            return Err(AppError::new(ErrorCode::ServiceUnavailable, "bus unavailable"));
        }
        self.matches.lock().unwrap().push(*matched);
        Ok(())
    }
}

/// Match source that replays fixed payloads to each subscriber, then ends.
pub struct ReplayMatchSource {
    payloads: Vec<Vec<u8>>,
}

impl ReplayMatchSource {
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        Self { payloads }
    }
}

#[async_trait]
impl MatchSource for ReplayMatchSource {
    async fn open(&self) -> AppResult<PayloadStream> {
        let items: Vec<AppResult<Vec<u8>>> = self.payloads.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_lite::stream::iter(items)))
    }
}

/// The full router over in-memory doubles.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub publisher: Arc<RecordingPublisher>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_matches(Vec::new())
    }

    pub fn with_matches(payloads: Vec<Vec<u8>>) -> Self {
        let store = Arc::new(MemoryStore::default());
        let queue = Arc::new(MemoryQueue::default());
        let publisher = Arc::new(RecordingPublisher::default());

        let state = Arc::new(AppState {
            store: store.clone(),
            recommendations: RecommendationService::new(store.clone(), queue.clone()),
            publisher: publisher.clone(),
            matches: Arc::new(ReplayMatchSource::new(payloads)),
            metrics_handle: None,
        });

        Self {
            store,
            queue,
            publisher,
            router: crate::router(state),
        }
    }

    pub async fn like(&self, from_user_id: i64, to_user_id: i64) {
        self.store
            .record_action(&ActionSubmitted { from_user_id, to_user_id, action: ActionKind::Like })
            .await
            .unwrap();
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.json(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let (status, bytes) = self.send(Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.json(json_request("PUT", uri, body)).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.json(json_request("POST", uri, body)).await
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

mod tests {
    use super::*;

    #[test]
    fn filter_bounds_are_inclusive() {
        let filter = Filter { user_id: 1, gender: Gender::Female, min_age: 20, max_age: 30 };
        let mut profile = Profile {
            user_id: 2,
            full_name: "Eve".into(),
            gender: Gender::Female,
            age: 20,
            description: None,
            photo: None,
            primary_rating: 30,
            behavioral_rating: 0,
            result_rating: 15,
        };
        assert!(filter.accepts(&profile));
        profile.age = 30;
        assert!(filter.accepts(&profile));
        profile.age = 31;
        assert!(!filter.accepts(&profile));
        profile.age = 25;
        profile.gender = Gender::Male;
        assert!(!filter.accepts(&profile));
    }
}
