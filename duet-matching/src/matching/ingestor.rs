use metrics::counter;

use duet_shared::errors::ErrorCode;
use duet_shared::types::event::payloads::ActionSubmitted;
use duet_shared::types::event::Event;

use crate::store::Store;

/// What happened to one action message. Every variant except `Applied` means
/// the message is dropped; none of them asks for redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied { behavioral_rating: i32 },
    Malformed,
    SelfAction,
    TargetMissing,
    Failed,
}

impl IngestOutcome {
    fn drop_reason(&self) -> Option<&'static str> {
        match self {
            Self::Applied { .. } => None,
            Self::Malformed => Some("malformed"),
            Self::SelfAction => Some("self_action"),
            Self::TargetMissing => Some("target_missing"),
            Self::Failed => Some("store_error"),
        }
    }
}

/// Decode one action message and apply it to the store.
///
/// A redelivered message is applied again: the action log has no
/// deduplication key, so a crash between commit and ack yields a second row.
pub async fn ingest_action(store: &dyn Store, payload: &[u8]) -> IngestOutcome {
    let outcome = apply(store, payload).await;
    if let Some(reason) = outcome.drop_reason() {
        counter!("actions_dropped_total", "reason" => reason).increment(1);
    }
    outcome
}

async fn apply(store: &dyn Store, payload: &[u8]) -> IngestOutcome {
    let event = match serde_json::from_slice::<Event<ActionSubmitted>>(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable action message");
            return IngestOutcome::Malformed;
        }
    };
    let action = event.data;

    if action.from_user_id == action.to_user_id {
        tracing::warn!(user_id = action.from_user_id, "dropping action aimed at self");
        return IngestOutcome::SelfAction;
    }

    match store.record_action(&action).await {
        Ok(target) => {
            counter!("actions_ingested_total", "action" => action.action.as_str()).increment(1);
            tracing::debug!(
                event_id = %event.id,
                from_user_id = action.from_user_id,
                to_user_id = action.to_user_id,
                action = %action.action,
                behavioral_rating = target.behavioral_rating,
                "action recorded"
            );
            IngestOutcome::Applied {
                behavioral_rating: target.behavioral_rating,
            }
        }
        Err(e) if e.code() == Some(ErrorCode::ProfileNotFound) => {
            tracing::warn!(
                event_id = %event.id,
                to_user_id = action.to_user_id,
                "dropping action for unknown target profile"
            );
            IngestOutcome::TargetMissing
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                event_id = %event.id,
                from_user_id = action.from_user_id,
                to_user_id = action.to_user_id,
                "failed to record action"
            );
            IngestOutcome::Failed
        }
    }
}
