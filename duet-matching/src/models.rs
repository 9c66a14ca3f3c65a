use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use duet_shared::errors::{AppError, AppResult};
use duet_shared::types::event::payloads::ActionKind;

use crate::schema::{filters, profiles, user_actions};

pub const MIN_RATING: i32 = 0;
pub const MAX_RATING: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            _ => Err(format!("unknown gender: {s}")),
        }
    }
}

// --- Ratings ---

/// Completeness score: 100 with description and photo, 60 with one of them, 30 with neither.
/// Empty values count as absent.
pub fn primary_rating(description: Option<&str>, photo: Option<&[u8]>) -> i32 {
    let has_description = description.is_some_and(|d| !d.is_empty());
    let has_photo = photo.is_some_and(|p| !p.is_empty());

    match (has_description, has_photo) {
        (true, true) => 100,
        (true, false) | (false, true) => 60,
        (false, false) => 30,
    }
}

/// One step up for a like, one step down for a dislike, clamped to [0, 100].
pub fn adjust_behavioral_rating(current: i32, action: ActionKind) -> i32 {
    let next = match action {
        ActionKind::Like => current.saturating_add(1),
        ActionKind::Dislike => current.saturating_sub(1),
    };
    next.clamp(MIN_RATING, MAX_RATING)
}

pub fn result_rating(primary: i32, behavioral: i32) -> i32 {
    (primary + behavioral) / 2
}

// --- Profile ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub full_name: String,
    pub gender: Gender,
    pub age: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, with = "photo_base64", skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<u8>>,
    pub primary_rating: i32,
    pub behavioral_rating: i32,
    pub result_rating: i32,
}

/// Everything a profile submission carries; ratings are derived, never submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInput {
    pub user_id: i64,
    pub full_name: String,
    pub gender: Gender,
    pub age: i32,
    pub description: Option<String>,
    pub photo: Option<Vec<u8>>,
}

#[derive(Debug, Queryable, Clone)]
pub struct ProfileRow {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub gender: String,
    pub age: i32,
    pub description: Option<String>,
    pub photo: Option<Vec<u8>>,
    pub primary_rating: i32,
    pub behavioral_rating: i32,
    pub result_rating: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> AppResult<Self> {
        let gender = row.gender.parse().map_err(AppError::internal)?;
        Ok(Self {
            user_id: row.user_id,
            full_name: row.full_name,
            gender,
            age: row.age,
            description: row.description,
            photo: row.photo,
            primary_rating: row.primary_rating,
            behavioral_rating: row.behavioral_rating,
            result_rating: row
                .result_rating
                .unwrap_or_else(|| result_rating(row.primary_rating, row.behavioral_rating)),
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub user_id: i64,
    pub full_name: String,
    pub gender: String,
    pub age: i32,
    pub description: Option<String>,
    pub photo: Option<Vec<u8>>,
    pub primary_rating: i32,
}

impl From<ProfileInput> for NewProfile {
    fn from(input: ProfileInput) -> Self {
        let primary_rating = primary_rating(input.description.as_deref(), input.photo.as_deref());
        Self {
            user_id: input.user_id,
            full_name: input.full_name,
            gender: input.gender.as_str().to_string(),
            age: input.age,
            description: input.description,
            photo: input.photo,
            primary_rating,
        }
    }
}

// --- Filter ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub user_id: i64,
    pub gender: Gender,
    pub min_age: i32,
    pub max_age: i32,
}

#[derive(Debug, Queryable, Clone)]
pub struct FilterRow {
    pub id: i64,
    pub user_id: i64,
    pub gender: String,
    pub min_age: i32,
    pub max_age: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FilterRow> for Filter {
    type Error = AppError;

    fn try_from(row: FilterRow) -> AppResult<Self> {
        Ok(Self {
            user_id: row.user_id,
            gender: row.gender.parse().map_err(AppError::internal)?,
            min_age: row.min_age,
            max_age: row.max_age,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = filters)]
pub struct NewFilter {
    pub user_id: i64,
    pub gender: String,
    pub min_age: i32,
    pub max_age: i32,
}

impl From<&Filter> for NewFilter {
    fn from(filter: &Filter) -> Self {
        Self {
            user_id: filter.user_id,
            gender: filter.gender.as_str().to_string(),
            min_age: filter.min_age,
            max_age: filter.max_age,
        }
    }
}

// --- UserAction ---

#[derive(Debug, Insertable)]
#[diesel(table_name = user_actions)]
pub struct NewUserAction {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub action: String,
    pub was_matched: bool,
}

impl NewUserAction {
    pub fn pending(from_user_id: i64, to_user_id: i64, action: ActionKind) -> Self {
        Self {
            from_user_id,
            to_user_id,
            action: action.as_str().to_string(),
            was_matched: false,
        }
    }
}

/// Two users with unmatched likes toward each other and no match yet.
/// `first_user_id < second_user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, QueryableByName)]
pub struct ReciprocalPair {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub first_user_id: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub second_user_id: i64,
}

mod photo_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(photo: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match photo {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub(crate) use photo_base64::deserialize as deserialize_photo;
