use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `duet.{entity}.{action}`
/// Example: `duet.match.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<i64>,
    pub data: T,
}

impl<T> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// RabbitMQ routing keys. Each key plays the role of a topic.
pub mod routing_keys {
    /// Like/dislike submissions, consumed by the action ingestor.
    pub const ACTION_SUBMITTED: &str = "duet.action.submitted";
    /// Claimed reciprocal likes, fanned out to match stream subscribers.
    pub const MATCH_CREATED: &str = "duet.match.created";
}

/// Event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum ActionKind {
        Like,
        Dislike,
    }

    impl ActionKind {
        pub fn as_str(&self) -> &'static str {
            match self {
                ActionKind::Like => "like",
                ActionKind::Dislike => "dislike",
            }
        }
    }

    impl std::fmt::Display for ActionKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl std::str::FromStr for ActionKind {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.to_lowercase().as_str() {
                "like" => Ok(ActionKind::Like),
                "dislike" => Ok(ActionKind::Dislike),
                _ => Err(format!("unknown action: {s}")),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ActionSubmitted {
        pub from_user_id: i64,
        pub to_user_id: i64,
        pub action: ActionKind,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub from_user_id: i64,
        pub to_user_id: i64,
    }
}

#[cfg(test)]
mod tests {
    use super::payloads::{ActionKind, ActionSubmitted};
    use super::*;

    #[test]
    fn action_wire_format_uses_upper_case_names() {
        let event = Event::new(
            "duet-matching",
            routing_keys::ACTION_SUBMITTED,
            ActionSubmitted {
                from_user_id: 7,
                to_user_id: 9,
                action: ActionKind::Dislike,
            },
        )
        .with_user(7);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["action"], "DISLIKE");
        assert_eq!(json["data"]["from_user_id"], 7);
        assert_eq!(json["user_id"], 7);
        assert_eq!(json["event_type"], "duet.action.submitted");
    }

    #[test]
    fn action_kind_parses_case_insensitively() {
        assert_eq!("LIKE".parse::<ActionKind>().unwrap(), ActionKind::Like);
        assert_eq!("dislike".parse::<ActionKind>().unwrap(), ActionKind::Dislike);
        assert!("superlike".parse::<ActionKind>().is_err());
    }
}
