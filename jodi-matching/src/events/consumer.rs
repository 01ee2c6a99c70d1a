use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};

use jodi_shared::errors::{AppError, AppResult, ErrorCode};
use jodi_shared::types::event::{payloads, queues, Event};
use jodi_shared::types::pagination::{PageParams, MAX_PAGE_SIZE};

use crate::services::{candidate_finder, reconciler};
use crate::AppState;

/// Consumes the recomputation work queue. Jobs only carry a profile id;
/// the handler re-reads current state, so coalesced duplicates and
/// replays converge on the same result. Failed jobs are requeued for
/// the broker to redeliver.
pub async fn run_recompute_worker(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state.rabbitmq.consume(queues::RECOMPUTE).await?;

    tracing::info!("recompute worker started");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let outcome = match serde_json::from_slice::<Event<payloads::RecomputeRequested>>(
                    &delivery.data,
                ) {
                    Ok(event) => handle_recompute(&state, &event.data).await,
                    Err(e) => {
                        // Requeueing a malformed payload would loop forever.
                        tracing::error!(error = %e, "failed to deserialize recompute job, dropping");
                        Ok(())
                    }
                };

                match outcome {
                    Ok(()) => {
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "recompute job failed, requeueing");
                        let _ = delivery
                            .nack(BasicNackOptions {
                                requeue: true,
                                ..Default::default()
                            })
                            .await;
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "recompute consumer error");
            }
        }
    }

    Ok(())
}

async fn handle_recompute(
    state: &AppState,
    job: &payloads::RecomputeRequested,
) -> AppResult<()> {
    tracing::info!(profile_id = %job.profile_id, kind = ?job.kind, "recomputing pairings");

    let take = state.config.recompute_take.min(MAX_PAGE_SIZE);
    let page = PageParams { skip: 0, take };

    let fresh = match candidate_finder::find_candidates(&state.db, job.profile_id, page) {
        Ok(paged) => paged,
        // The profile disappeared or deactivated while the job waited;
        // the job is moot, not failed.
        Err(AppError::Known { code, .. })
            if code == ErrorCode::ProfileNotFound || code == ErrorCode::ProfileDeactivated =>
        {
            tracing::info!(profile_id = %job.profile_id, "profile gone, dropping recompute job");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let pairings = reconciler::reconcile(&state.db, job.profile_id, &fresh.items)?;

    tracing::info!(
        profile_id = %job.profile_id,
        candidates = fresh.items.len(),
        undelivered = pairings.len(),
        "recomputation complete"
    );
    Ok(())
}
