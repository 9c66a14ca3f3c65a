use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures_lite::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use duet_shared::errors::AppResult;

use crate::events::relay::forward_matches;
use crate::AppState;

const HEARTBEAT: Duration = Duration::from_secs(15);

// --- GET /matches/stream ---

/// One `match` event per claimed pair until the client goes away. The bus
/// subscription is dropped with the response stream.
pub async fn stream_matches(
    State(state): State<Arc<AppState>>,
) -> AppResult<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>> {
    let payloads = state.matches.open().await?;
    tracing::info!("match stream opened");

    let events = forward_matches(payloads)
        .map(|matched| SseEvent::default().event("match").json_data(matched));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("heartbeat")))
}

#[cfg(test)]
mod tests {
    use crate::testing::{match_message, TestApp};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn relays_match_events_as_sse() {
        let app = TestApp::with_matches(vec![
            match_message(1, 2),
            b"garbage".to_vec(),
            match_message(4, 7),
        ]);

        let (status, body) = app.get_text("/matches/stream").await;

        assert_eq!(status, StatusCode::OK);
        let frames: Vec<&str> = body.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("event: match"));
        assert!(frames[0].contains(r#"data: {"from_user_id":1,"to_user_id":2}"#));
        assert!(frames[1].contains(r#"data: {"from_user_id":4,"to_user_id":7}"#));
    }
}
