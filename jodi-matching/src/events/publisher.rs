use uuid::Uuid;

use jodi_shared::clients::rabbitmq::RabbitMQClient;
use jodi_shared::errors::{AppError, AppResult, ErrorCode};
use jodi_shared::types::event::payloads::{
    PairingDelivered, PreferenceSaved, ProfileCreated, ProfileDeactivated, RecomputeKind,
    RecomputeRequested,
};
use jodi_shared::types::event::{queues, routing_keys, Event};

use crate::services::collaborators::SOURCE;

/// Enqueues a delayed recomputation job. The caller's operation is not
/// complete until this succeeds, so failure maps to QUEUE_UNAVAILABLE
/// instead of being swallowed.
pub async fn enqueue_recompute(
    rabbitmq: &RabbitMQClient,
    profile_id: Uuid,
    kind: RecomputeKind,
    delay_ms: u64,
) -> AppResult<()> {
    let job = Event::new(
        SOURCE,
        "recompute.requested",
        RecomputeRequested { profile_id, kind },
    )
    .with_profile(profile_id);

    rabbitmq
        .publish_job(queues::RECOMPUTE, queues::RECOMPUTE_WAIT, &job, delay_ms)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, profile_id = %profile_id, "failed to enqueue recompute job");
            AppError::new(ErrorCode::QueueUnavailable, "failed to enqueue recomputation")
        })
}

// Domain event publishers below are fire-and-forget: downstream
// consumers are informational and must not fail the calling operation.

pub async fn publish_profile_created(rabbitmq: &RabbitMQClient, profile_id: Uuid) {
    let event = Event::new(SOURCE, "profile.created", ProfileCreated { profile_id })
        .with_profile(profile_id);
    if let Err(e) = rabbitmq.publish(routing_keys::PROFILE_CREATED, &event).await {
        tracing::warn!(error = %e, profile_id = %profile_id, "failed to publish profile.created");
    }
}

pub async fn publish_profile_deactivated(rabbitmq: &RabbitMQClient, profile_id: Uuid) {
    let event = Event::new(SOURCE, "profile.deactivated", ProfileDeactivated { profile_id })
        .with_profile(profile_id);
    if let Err(e) = rabbitmq
        .publish(routing_keys::PROFILE_DEACTIVATED, &event)
        .await
    {
        tracing::warn!(error = %e, profile_id = %profile_id, "failed to publish profile.deactivated");
    }
}

pub async fn publish_preference_saved(rabbitmq: &RabbitMQClient, profile_id: Uuid) {
    let event = Event::new(SOURCE, "preference.saved", PreferenceSaved { profile_id })
        .with_profile(profile_id);
    if let Err(e) = rabbitmq.publish(routing_keys::PREFERENCE_SAVED, &event).await {
        tracing::warn!(error = %e, profile_id = %profile_id, "failed to publish preference.saved");
    }
}

pub async fn publish_pairing_delivered(
    rabbitmq: &RabbitMQClient,
    male_profile_id: Uuid,
    female_profile_id: Uuid,
) {
    let event = Event::new(
        SOURCE,
        "pairing.delivered",
        PairingDelivered {
            male_profile_id,
            female_profile_id,
        },
    );
    if let Err(e) = rabbitmq
        .publish(routing_keys::PAIRING_DELIVERED, &event)
        .await
    {
        tracing::warn!(
            error = %e,
            male_profile_id = %male_profile_id,
            female_profile_id = %female_profile_id,
            "failed to publish pairing.delivered"
        );
    }
}
