use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use jodi_shared::clients::db::DbPool;
use jodi_shared::clients::rabbitmq::RabbitMQClient;
use jodi_shared::errors::{AppError, AppResult, ErrorCode};

use crate::config::AppConfig;
use crate::events::publisher;
use crate::models::{DeliveryStatus, Gender, Pairing, Profile};
use crate::schema::{pairings, profiles};
use crate::services::collaborators::{DocumentStore, Notifier};

#[derive(Debug, Default, Clone, Serialize)]
pub struct DistributionReport {
    pub batches: usize,
    pub selected: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Walks all female profiles in fixed-size batches and delivers at most
/// one undelivered pairing per female per run. The profile count is
/// fixed at the start so the walk terminates even while profiles are
/// being created. Per-pairing failures are logged and skipped; the run
/// continues.
pub async fn distribute_all(
    pool: &DbPool,
    notifier: &dyn Notifier,
    documents: &dyn DocumentStore,
    rabbitmq: &RabbitMQClient,
    config: &AppConfig,
) -> AppResult<DistributionReport> {
    let released = release_stale_claims(pool, config.claim_stale_secs)?;
    if released > 0 {
        tracing::warn!(released = released, "released stale in-flight claims");
    }

    let total = count_females(pool)?;
    let take = config.distribute_batch_size;
    let mut report = DistributionReport::default();
    let mut skip = 0;

    while skip < total {
        let batch = female_batch(pool, skip, take)?;
        if batch.is_empty() {
            break;
        }
        report.batches += 1;

        let undelivered = undelivered_for(pool, &batch)?;
        let picked = first_per_female(undelivered);
        report.selected += picked.len();

        for pairing in picked {
            match deliver_pairing(pool, notifier, documents, &pairing).await {
                Ok(true) => {
                    report.delivered += 1;
                    publisher::publish_pairing_delivered(
                        rabbitmq,
                        pairing.male_profile_id,
                        pairing.female_profile_id,
                    )
                    .await;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        error = %e,
                        male_profile_id = %pairing.male_profile_id,
                        female_profile_id = %pairing.female_profile_id,
                        "pairing delivery failed"
                    );
                }
            }
        }

        skip += take;
    }

    tracing::info!(
        batches = report.batches,
        selected = report.selected,
        delivered = report.delivered,
        skipped = report.skipped,
        failed = report.failed,
        "distribution run complete"
    );

    Ok(report)
}

/// Keeps the first pairing per female from a list sorted by
/// (female_profile_id, male_profile_id), giving every female at most
/// one delivery per run and a deterministic pick.
pub fn first_per_female(sorted: Vec<Pairing>) -> Vec<Pairing> {
    let mut picked: Vec<Pairing> = Vec::new();
    for pairing in sorted {
        if picked
            .last()
            .map(|prev| prev.female_profile_id != pairing.female_profile_id)
            .unwrap_or(true)
        {
            picked.push(pairing);
        }
    }
    picked
}

/// Claims the pairing, notifies both sides and marks it delivered. The
/// claim is released on any failure so a later run can retry. Returns
/// `Ok(false)` when the pairing was already taken or one side is no
/// longer deliverable.
async fn deliver_pairing(
    pool: &DbPool,
    notifier: &dyn Notifier,
    documents: &dyn DocumentStore,
    pairing: &Pairing,
) -> AppResult<bool> {
    if !claim(pool, pairing)? {
        return Ok(false);
    }

    let (male, female) = match load_sides(pool, pairing)? {
        Some(sides) => sides,
        None => {
            // One side vanished or deactivated since reconciliation.
            soft_delete(pool, pairing)?;
            return Ok(false);
        }
    };

    let result = notify_both(notifier, documents, &male, &female).await;
    match result {
        Ok(()) => {
            mark_delivered(pool, pairing)?;
            Ok(true)
        }
        Err(e) => {
            release(pool, pairing)?;
            Err(e)
        }
    }
}

async fn notify_both(
    notifier: &dyn Notifier,
    documents: &dyn DocumentStore,
    male: &Profile,
    female: &Profile,
) -> AppResult<()> {
    let male_docs = documents.documents_for(male.id).await?;
    let female_docs = documents.documents_for(female.id).await?;

    notifier
        .deliver(&male.chat_handle, female, &female_docs)
        .await?;
    notifier
        .deliver(&female.chat_handle, male, &male_docs)
        .await?;
    Ok(())
}

fn conn_err(e: impl std::fmt::Display) -> AppError {
    AppError::internal(e.to_string())
}

fn count_females(pool: &DbPool) -> AppResult<i64> {
    let mut conn = pool.get().map_err(conn_err)?;
    let total = profiles::table
        .filter(profiles::gender.eq(Gender::Female))
        .filter(profiles::deactivated_at.is_null())
        .count()
        .get_result(&mut conn)?;
    Ok(total)
}

fn female_batch(pool: &DbPool, skip: i64, take: i64) -> AppResult<Vec<Uuid>> {
    let mut conn = pool.get().map_err(conn_err)?;
    let batch = profiles::table
        .filter(profiles::gender.eq(Gender::Female))
        .filter(profiles::deactivated_at.is_null())
        .order(profiles::id.asc())
        .offset(skip)
        .limit(take)
        .select(profiles::id)
        .load::<Uuid>(&mut conn)?;
    Ok(batch)
}

/// Loads both profiles of a pairing, or `None` when either side is
/// missing or deactivated.
fn load_sides(pool: &DbPool, pairing: &Pairing) -> AppResult<Option<(Profile, Profile)>> {
    let mut conn = pool.get().map_err(conn_err)?;
    let male = profiles::table
        .find(pairing.male_profile_id)
        .first::<Profile>(&mut conn)
        .optional()?;
    let female = profiles::table
        .find(pairing.female_profile_id)
        .first::<Profile>(&mut conn)
        .optional()?;

    match (male, female) {
        (Some(male), Some(female)) if male.is_active() && female.is_active() => {
            Ok(Some((male, female)))
        }
        _ => Ok(None),
    }
}

fn undelivered_for(pool: &DbPool, females: &[Uuid]) -> AppResult<Vec<Pairing>> {
    let mut conn = pool.get().map_err(conn_err)?;
    let rows = pairings::table
        .filter(pairings::female_profile_id.eq_any(females.to_vec()))
        .filter(pairings::delivery_status.eq(DeliveryStatus::Undelivered))
        .filter(pairings::deleted_at.is_null())
        .order((
            pairings::female_profile_id.asc(),
            pairings::male_profile_id.asc(),
        ))
        .load::<Pairing>(&mut conn)?;
    Ok(rows)
}

/// Conditional state transition UNDELIVERED -> IN_FLIGHT. Zero rows
/// updated means another run already took it.
fn claim(pool: &DbPool, pairing: &Pairing) -> AppResult<bool> {
    let mut conn = pool.get().map_err(conn_err)?;
    let updated = diesel::update(
        pairings::table
            .find((pairing.male_profile_id, pairing.female_profile_id))
            .filter(pairings::delivery_status.eq(DeliveryStatus::Undelivered)),
    )
    .set((
        pairings::delivery_status.eq(DeliveryStatus::InFlight),
        pairings::claimed_at.eq(Utc::now()),
    ))
    .execute(&mut conn)?;
    Ok(updated == 1)
}

fn release(pool: &DbPool, pairing: &Pairing) -> AppResult<()> {
    let mut conn = pool.get().map_err(conn_err)?;
    diesel::update(
        pairings::table
            .find((pairing.male_profile_id, pairing.female_profile_id))
            .filter(pairings::delivery_status.eq(DeliveryStatus::InFlight)),
    )
    .set((
        pairings::delivery_status.eq(DeliveryStatus::Undelivered),
        pairings::claimed_at.eq(None::<chrono::DateTime<Utc>>),
    ))
    .execute(&mut conn)?;
    Ok(())
}

fn mark_delivered(pool: &DbPool, pairing: &Pairing) -> AppResult<()> {
    let mut conn = pool.get().map_err(conn_err)?;
    let updated = diesel::update(
        pairings::table
            .find((pairing.male_profile_id, pairing.female_profile_id))
            .filter(pairings::delivery_status.eq(DeliveryStatus::InFlight)),
    )
    .set((
        pairings::delivery_status.eq(DeliveryStatus::Delivered),
        pairings::delivered_at.eq(Utc::now()),
    ))
    .execute(&mut conn)?;

    if updated == 0 {
        return Err(AppError::new(
            ErrorCode::PairingNotFound,
            "pairing claim lost before it could be marked delivered",
        ));
    }
    Ok(())
}

fn soft_delete(pool: &DbPool, pairing: &Pairing) -> AppResult<()> {
    let mut conn = pool.get().map_err(conn_err)?;
    diesel::update(
        pairings::table.find((pairing.male_profile_id, pairing.female_profile_id)),
    )
    .set((
        pairings::delivery_status.eq(DeliveryStatus::Undelivered),
        pairings::claimed_at.eq(None::<chrono::DateTime<Utc>>),
        pairings::deleted_at.eq(Utc::now()),
    ))
    .execute(&mut conn)?;
    Ok(())
}

/// Returns IN_FLIGHT pairings whose claim outlived `stale_secs` to
/// UNDELIVERED. Covers crashes between claim and outcome.
fn release_stale_claims(pool: &DbPool, stale_secs: i64) -> AppResult<usize> {
    let mut conn = pool.get().map_err(conn_err)?;
    let cutoff = Utc::now() - Duration::seconds(stale_secs);
    let released = diesel::update(
        pairings::table
            .filter(pairings::delivery_status.eq(DeliveryStatus::InFlight))
            .filter(pairings::claimed_at.lt(cutoff)),
    )
    .set((
        pairings::delivery_status.eq(DeliveryStatus::Undelivered),
        pairings::claimed_at.eq(None::<chrono::DateTime<Utc>>),
    ))
    .execute(&mut conn)?;
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::collaborators::{DocumentKind, ProfileDocuments};
    use crate::services::testutil;
    use axum::async_trait;
    use jodi_shared::types::event::payloads::DocumentRef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoDocuments;

    #[async_trait]
    impl DocumentStore for NoDocuments {
        async fn active_document(
            &self,
            _profile_id: Uuid,
            _kind: DocumentKind,
        ) -> AppResult<Option<DocumentRef>> {
            Ok(None)
        }
    }

    /// Succeeds for the first `fail_from` deliveries, then errors.
    struct FlakyNotifier {
        calls: AtomicUsize,
        fail_from: usize,
    }

    impl FlakyNotifier {
        fn failing_after(fail_from: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from,
            }
        }
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn deliver(
            &self,
            _to_chat_handle: &str,
            _counterpart: &Profile,
            _documents: &ProfileDocuments,
        ) -> AppResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_from {
                Ok(())
            } else {
                Err(AppError::new(
                    ErrorCode::DeliveryFailed,
                    "chat channel rejected the message",
                ))
            }
        }
    }

    #[tokio::test]
    async fn failed_second_direction_releases_the_claim() {
        let Some(pool) = testutil::test_pool() else {
            return;
        };
        let male = testutil::insert_profile(&pool, Gender::Male);
        let female = testutil::insert_profile(&pool, Gender::Female);
        let row = testutil::insert_pairing(
            &pool,
            male.id,
            female.id,
            DeliveryStatus::Undelivered,
        );

        let notifier = FlakyNotifier::failing_after(1);
        let result = deliver_pairing(&pool, &notifier, &NoDocuments, &row).await;
        assert!(result.is_err());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);

        let after = testutil::find_pairing(&pool, male.id, female.id).unwrap();
        assert_eq!(after.delivery_status, DeliveryStatus::Undelivered);
        assert!(after.claimed_at.is_none());
        assert!(after.delivered_at.is_none());
    }

    #[tokio::test]
    async fn delivered_pairing_is_never_reselected() {
        let Some(pool) = testutil::test_pool() else {
            return;
        };
        let male = testutil::insert_profile(&pool, Gender::Male);
        let female = testutil::insert_profile(&pool, Gender::Female);
        let row = testutil::insert_pairing(
            &pool,
            male.id,
            female.id,
            DeliveryStatus::Undelivered,
        );

        let notifier = FlakyNotifier::failing_after(usize::MAX);
        let result = deliver_pairing(&pool, &notifier, &NoDocuments, &row).await;
        assert!(matches!(result, Ok(true)));

        let after = testutil::find_pairing(&pool, male.id, female.id).unwrap();
        assert_eq!(after.delivery_status, DeliveryStatus::Delivered);
        assert!(after.delivered_at.is_some());

        assert!(undelivered_for(&pool, &[female.id]).unwrap().is_empty());
        assert!(!claim(&pool, &after).unwrap());
    }

    fn pairing(male: Uuid, female: Uuid) -> Pairing {
        Pairing {
            male_profile_id: male,
            female_profile_id: female,
            delivery_status: DeliveryStatus::Undelivered,
            created_at: Utc::now(),
            claimed_at: None,
            delivered_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn first_per_female_keeps_one_row_each() {
        let f1 = Uuid::now_v7();
        let f2 = Uuid::now_v7();
        let rows = vec![
            pairing(Uuid::now_v7(), f1),
            pairing(Uuid::now_v7(), f1),
            pairing(Uuid::now_v7(), f2),
        ];
        let expected_first = rows[0].male_profile_id;

        let picked = first_per_female(rows);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].female_profile_id, f1);
        assert_eq!(picked[0].male_profile_id, expected_first);
        assert_eq!(picked[1].female_profile_id, f2);
    }

    #[test]
    fn first_per_female_handles_empty_input() {
        assert!(first_per_female(Vec::new()).is_empty());
    }
}
