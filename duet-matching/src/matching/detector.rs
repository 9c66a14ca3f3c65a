use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use duet_shared::errors::AppResult;
use duet_shared::types::event::payloads::MatchCreated;

use crate::events::publisher::EventPublisher;
use crate::store::Store;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub claimed: usize,
    pub skipped: usize,
    pub publish_failures: usize,
}

/// One detection cycle: find reciprocal likes, claim each pair, publish a
/// match for every claim that succeeded.
///
/// The claim is the source of truth. A publish failure is logged and the pair
/// stays matched, so that notification is lost rather than repeated.
pub async fn run_scan_cycle(store: &dyn Store, publisher: &dyn EventPublisher) -> AppResult<ScanReport> {
    let pairs = store.find_reciprocal_likes().await?;
    let mut report = ScanReport {
        candidates: pairs.len(),
        ..ScanReport::default()
    };

    for pair in &pairs {
        let claimed = match store.claim_pair(pair).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    first_user_id = pair.first_user_id,
                    second_user_id = pair.second_user_id,
                    "failed to claim pair"
                );
                report.skipped += 1;
                continue;
            }
        };

        if !claimed {
            tracing::debug!(
                first_user_id = pair.first_user_id,
                second_user_id = pair.second_user_id,
                "pair already claimed, skipping"
            );
            report.skipped += 1;
            continue;
        }

        report.claimed += 1;
        counter!("matches_claimed_total").increment(1);

        let event = MatchCreated {
            from_user_id: pair.first_user_id,
            to_user_id: pair.second_user_id,
        };
        match publisher.publish_match(&event).await {
            Ok(()) => tracing::info!(
                from_user_id = event.from_user_id,
                to_user_id = event.to_user_id,
                "match published"
            ),
            Err(e) => {
                report.publish_failures += 1;
                counter!("matches_publish_failed_total").increment(1);
                tracing::error!(
                    error = %e,
                    from_user_id = event.from_user_id,
                    to_user_id = event.to_user_id,
                    "failed to publish match, notification lost"
                );
            }
        }
    }

    Ok(report)
}

/// Spawn the periodic scanner. A cycle always runs to completion; ticks that
/// fall due meanwhile are delayed, never stacked.
pub fn spawn_match_detector(
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_secs = period.as_secs(), "match detector started");

        loop {
            interval.tick().await;

            match run_scan_cycle(store.as_ref(), publisher.as_ref()).await {
                Ok(report) if report.candidates == 0 => {
                    tracing::debug!("no reciprocal likes found");
                }
                Ok(report) => {
                    tracing::info!(
                        candidates = report.candidates,
                        claimed = report.claimed,
                        skipped = report.skipped,
                        publish_failures = report.publish_failures,
                        "match scan finished"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "match scan failed");
                }
            }
        }
    })
}
