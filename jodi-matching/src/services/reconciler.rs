use std::collections::HashSet;

use diesel::prelude::*;
use uuid::Uuid;

use jodi_shared::clients::db::DbPool;
use jodi_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{DeliveryStatus, Gender, NewPairing, Pairing, Profile};
use crate::schema::{pairings, profiles};

/// Decides which pairings to insert for `subject` given a fresh
/// candidate list and the counterpart ids of every pairing that
/// survives reconciliation. Pure so the idempotency and orientation
/// rules are testable without a database.
pub fn plan_pairings(
    subject: &Profile,
    fresh: &[Profile],
    surviving: &HashSet<Uuid>,
) -> Vec<NewPairing> {
    let mut seen = HashSet::new();
    fresh
        .iter()
        .filter(|candidate| candidate.id != subject.id)
        .filter(|candidate| !surviving.contains(&candidate.id))
        .filter(|candidate| seen.insert(candidate.id))
        .map(|candidate| NewPairing::oriented(subject, candidate.id))
        .collect()
}

/// Replaces the undelivered pairings of `profile_id` with pairings
/// against `fresh`, in one transaction. Delivered and in-flight
/// pairings are never touched; candidates already paired are skipped.
/// Returns the undelivered pairings on record after the call.
pub fn reconcile(pool: &DbPool, profile_id: Uuid, fresh: &[Profile]) -> AppResult<Vec<Pairing>> {
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;

    conn.transaction::<_, AppError, _>(|conn| {
        let profile = profiles::table
            .find(profile_id)
            .first::<Profile>(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;

        let dropped;
        let surviving: HashSet<Uuid>;

        match profile.gender {
            Gender::Male => {
                dropped = diesel::delete(
                    pairings::table
                        .filter(pairings::male_profile_id.eq(profile_id))
                        .filter(pairings::delivery_status.eq(DeliveryStatus::Undelivered)),
                )
                .execute(conn)?;

                // Soft-deleted rows stay in the set: their composite key
                // still exists, so re-proposing them would conflict anyway.
                surviving = pairings::table
                    .filter(pairings::male_profile_id.eq(profile_id))
                    .select(pairings::female_profile_id)
                    .load::<Uuid>(conn)?
                    .into_iter()
                    .collect();
            }
            Gender::Female => {
                dropped = diesel::delete(
                    pairings::table
                        .filter(pairings::female_profile_id.eq(profile_id))
                        .filter(pairings::delivery_status.eq(DeliveryStatus::Undelivered)),
                )
                .execute(conn)?;

                surviving = pairings::table
                    .filter(pairings::female_profile_id.eq(profile_id))
                    .select(pairings::male_profile_id)
                    .load::<Uuid>(conn)?
                    .into_iter()
                    .collect();
            }
        }

        let rows = plan_pairings(&profile, fresh, &surviving);
        let inserted = diesel::insert_into(pairings::table)
            .values(&rows)
            .on_conflict((pairings::male_profile_id, pairings::female_profile_id))
            .do_nothing()
            .execute(conn)?;

        tracing::info!(
            profile_id = %profile_id,
            dropped = dropped,
            kept = surviving.len(),
            proposed = inserted,
            "pairings reconciled"
        );

        let current = match profile.gender {
            Gender::Male => pairings::table
                .filter(pairings::male_profile_id.eq(profile_id))
                .filter(pairings::delivery_status.eq(DeliveryStatus::Undelivered))
                .order(pairings::female_profile_id.asc())
                .load::<Pairing>(conn)?,
            Gender::Female => pairings::table
                .filter(pairings::female_profile_id.eq(profile_id))
                .filter(pairings::delivery_status.eq(DeliveryStatus::Undelivered))
                .order(pairings::male_profile_id.asc())
                .load::<Pairing>(conn)?,
        };

        Ok(current)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_profile;
    use crate::services::testutil;

    #[test]
    fn plan_orients_by_gender() {
        let male = sample_profile(Gender::Male);
        let candidate = sample_profile(Gender::Female);
        let rows = plan_pairings(&male, &[candidate.clone()], &HashSet::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].male_profile_id, male.id);
        assert_eq!(rows[0].female_profile_id, candidate.id);

        let rows = plan_pairings(&candidate, &[male.clone()], &HashSet::new());
        assert_eq!(rows[0].male_profile_id, male.id);
        assert_eq!(rows[0].female_profile_id, candidate.id);
    }

    #[test]
    fn plan_skips_surviving_counterparts_and_self() {
        let subject = sample_profile(Gender::Female);
        let kept = sample_profile(Gender::Male);
        let new = sample_profile(Gender::Male);
        let surviving: HashSet<Uuid> = [kept.id].into_iter().collect();

        let rows = plan_pairings(
            &subject,
            &[kept.clone(), new.clone(), subject.clone()],
            &surviving,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].male_profile_id, new.id);
    }

    #[test]
    fn plan_deduplicates_repeated_candidates() {
        let subject = sample_profile(Gender::Male);
        let candidate = sample_profile(Gender::Female);
        let rows = plan_pairings(
            &subject,
            &[candidate.clone(), candidate.clone()],
            &HashSet::new(),
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn plan_is_idempotent_over_surviving_set() {
        let subject = sample_profile(Gender::Male);
        let candidates: Vec<Profile> = (0..3).map(|_| sample_profile(Gender::Female)).collect();

        let first = plan_pairings(&subject, &candidates, &HashSet::new());
        let surviving: HashSet<Uuid> =
            first.iter().map(|row| row.female_profile_id).collect();
        let second = plan_pairings(&subject, &candidates, &surviving);
        assert!(second.is_empty());
    }

    #[test]
    fn reconcile_with_no_candidates_preserves_delivered_rows() {
        let Some(pool) = testutil::test_pool() else {
            return;
        };
        let male = testutil::insert_profile(&pool, Gender::Male);
        let delivered_f = testutil::insert_profile(&pool, Gender::Female);
        let pending_f = testutil::insert_profile(&pool, Gender::Female);
        testutil::insert_pairing(&pool, male.id, delivered_f.id, DeliveryStatus::Delivered);
        testutil::insert_pairing(&pool, male.id, pending_f.id, DeliveryStatus::Undelivered);

        let current = reconcile(&pool, male.id, &[]).unwrap();
        assert!(current.is_empty());

        let kept = testutil::find_pairing(&pool, male.id, delivered_f.id).unwrap();
        assert_eq!(kept.delivery_status, DeliveryStatus::Delivered);
        assert!(testutil::find_pairing(&pool, male.id, pending_f.id).is_none());

        // The delivered counterpart may come back as a candidate; the
        // pairing must not be re-proposed.
        let again = reconcile(&pool, male.id, &[delivered_f.clone()]).unwrap();
        assert!(again.is_empty());
        let kept = testutil::find_pairing(&pool, male.id, delivered_f.id).unwrap();
        assert_eq!(kept.delivery_status, DeliveryStatus::Delivered);
    }
}
