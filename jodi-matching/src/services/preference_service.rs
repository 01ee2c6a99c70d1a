use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use jodi_shared::clients::db::DbPool;
use jodi_shared::clients::rabbitmq::RabbitMQClient;
use jodi_shared::errors::{AppError, AppResult, ErrorCode};
use jodi_shared::types::event::payloads::RecomputeKind;

use crate::config::AppConfig;
use crate::events::publisher;
use crate::models::{AnnualIncome, MaritalStatus, PartnerPreference, Profile, Religion};
use crate::schema::{castes, cities, countries, partner_preferences, profiles, states};
use crate::services::candidate_finder::resolve_age_bounds;

/// Partner preference as submitted by the agent. Unset fields mean "no
/// restriction" for the set-valued filters and "derive a default" for
/// the age bounds.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PreferenceInput {
    #[validate(range(min = 18, max = 100))]
    pub min_age: Option<i32>,
    #[validate(range(min = 18, max = 100))]
    pub max_age: Option<i32>,
    pub religions: Option<Vec<Religion>>,
    pub caste_ids: Option<Vec<i32>>,
    pub marital_statuses: Option<Vec<MaritalStatus>>,
    pub min_income: Option<AnnualIncome>,
    /// Accepted on the wire but not yet supported as a filter.
    pub max_income: Option<AnnualIncome>,
    pub city_ids: Option<Vec<i32>>,
    pub state_ids: Option<Vec<i32>>,
    pub country_ids: Option<Vec<i32>>,
}

/// Turns validated input into the stored row, resolving age defaults.
/// Pure so bound resolution and rejection rules are testable directly.
pub fn build_preference(
    profile: &Profile,
    input: &PreferenceInput,
    now: DateTime<Utc>,
) -> AppResult<PartnerPreference> {
    if input.max_income.is_some() {
        return Err(AppError::new(
            ErrorCode::Unimplemented,
            "maximum income filter is not supported yet",
        ));
    }

    let floor = profile.gender.legal_min_age();
    if let Some(min) = input.min_age {
        if min < floor {
            return Err(AppError::new(
                ErrorCode::InvalidAgeBounds,
                format!("minimum age must be at least {floor}"),
            ));
        }
    }
    if let (Some(min), Some(max)) = (input.min_age, input.max_age) {
        if max < min {
            return Err(AppError::new(
                ErrorCode::InvalidAgeBounds,
                "maximum age must not be below minimum age",
            ));
        }
    }

    let age = profile.age_on(now.date_naive());
    let (min_age, max_age) = resolve_age_bounds(profile.gender, age, input.min_age, input.max_age);

    Ok(PartnerPreference {
        profile_id: profile.id,
        min_age,
        max_age,
        religions: input.religions.clone(),
        caste_ids: input.caste_ids.clone(),
        marital_statuses: input.marital_statuses.clone(),
        min_income: input.min_income,
        city_ids: input.city_ids.clone(),
        state_ids: input.state_ids.clone(),
        country_ids: input.country_ids.clone(),
        updated_at: now,
    })
}

/// Upserts the preference and enqueues the delayed recomputation job.
/// The save is not complete until the job is enqueued; an enqueue
/// failure surfaces as QUEUE_UNAVAILABLE even though the row committed.
pub async fn save_preference(
    pool: &DbPool,
    rabbitmq: &RabbitMQClient,
    config: &AppConfig,
    profile_id: Uuid,
    input: PreferenceInput,
) -> AppResult<PartnerPreference> {
    input
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let profile = load_active_profile(pool, profile_id)?;
    validate_references(pool, &input)?;

    let row = build_preference(&profile, &input, Utc::now())?;

    {
        let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;
        diesel::insert_into(partner_preferences::table)
            .values(&row)
            .on_conflict(partner_preferences::profile_id)
            .do_update()
            .set(&row)
            .execute(&mut conn)?;
    }

    tracing::info!(profile_id = %profile_id, "partner preference saved");

    publisher::enqueue_recompute(
        rabbitmq,
        profile_id,
        RecomputeKind::Update,
        config.recompute_delay_ms,
    )
    .await?;
    publisher::publish_preference_saved(rabbitmq, profile_id).await;

    Ok(row)
}

/// `None` when no preference has been saved yet; candidate queries fall
/// back to profile-derived defaults in that case.
pub fn get_preference(pool: &DbPool, profile_id: Uuid) -> AppResult<Option<PartnerPreference>> {
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;

    let exists = diesel::select(diesel::dsl::exists(
        profiles::table.filter(profiles::id.eq(profile_id)),
    ))
    .get_result::<bool>(&mut conn)?;
    if !exists {
        return Err(AppError::new(ErrorCode::ProfileNotFound, "profile not found"));
    }

    Ok(partner_preferences::table
        .find(profile_id)
        .first::<PartnerPreference>(&mut conn)
        .optional()?)
}

fn load_active_profile(pool: &DbPool, profile_id: Uuid) -> AppResult<Profile> {
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;
    let profile = profiles::table
        .find(profile_id)
        .first::<Profile>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;

    if !profile.is_active() {
        return Err(AppError::new(
            ErrorCode::ProfileDeactivated,
            "profile is deactivated",
        ));
    }
    Ok(profile)
}

/// Every referenced caste, city, state and country id must exist.
fn validate_references(pool: &DbPool, input: &PreferenceInput) -> AppResult<()> {
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;

    if let Some(ids) = &input.caste_ids {
        let found: i64 = castes::table
            .filter(castes::id.eq_any(ids.clone()))
            .count()
            .get_result(&mut conn)?;
        if found != ids.len() as i64 {
            return Err(AppError::new(ErrorCode::CasteNotFound, "unknown caste id"));
        }
    }
    if let Some(ids) = &input.city_ids {
        let found: i64 = cities::table
            .filter(cities::id.eq_any(ids.clone()))
            .count()
            .get_result(&mut conn)?;
        if found != ids.len() as i64 {
            return Err(AppError::new(ErrorCode::CityNotFound, "unknown city id"));
        }
    }
    if let Some(ids) = &input.state_ids {
        let found: i64 = states::table
            .filter(states::id.eq_any(ids.clone()))
            .count()
            .get_result(&mut conn)?;
        if found != ids.len() as i64 {
            return Err(AppError::new(ErrorCode::StateNotFound, "unknown state id"));
        }
    }
    if let Some(ids) = &input.country_ids {
        let found: i64 = countries::table
            .filter(countries::id.eq_any(ids.clone()))
            .count()
            .get_result(&mut conn)?;
        if found != ids.len() as i64 {
            return Err(AppError::new(ErrorCode::CountryNotFound, "unknown country id"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{date, sample_profile};
    use crate::models::Gender;
    use chrono::TimeZone;

    fn empty_input() -> PreferenceInput {
        PreferenceInput {
            min_age: None,
            max_age: None,
            religions: None,
            caste_ids: None,
            marital_statuses: None,
            min_income: None,
            max_income: None,
            city_ids: None,
            state_ids: None,
            country_ids: None,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date(y, m, d).and_hms_opt(12, 0, 0).unwrap())
    }

    #[test]
    fn unset_ages_get_gender_defaults() {
        let profile = sample_profile(Gender::Male); // dob 1995-06-15
        let row = build_preference(&profile, &empty_input(), at(2025, 6, 15)).unwrap();
        assert_eq!((row.min_age, row.max_age), (24, 31));
    }

    #[test]
    fn max_income_is_rejected_as_unimplemented() {
        let profile = sample_profile(Gender::Male);
        let input = PreferenceInput {
            max_income: Some(AnnualIncome::TenLakhOrMore),
            ..empty_input()
        };
        let err = build_preference(&profile, &input, at(2025, 1, 1)).unwrap_err();
        match err {
            AppError::Known { code, .. } => assert_eq!(code, ErrorCode::Unimplemented),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let profile = sample_profile(Gender::Female);
        let input = PreferenceInput {
            min_age: Some(30),
            max_age: Some(25),
            ..empty_input()
        };
        let err = build_preference(&profile, &input, at(2025, 1, 1)).unwrap_err();
        match err {
            AppError::Known { code, .. } => assert_eq!(code, ErrorCode::InvalidAgeBounds),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn explicit_minimum_below_legal_floor_is_rejected() {
        let profile = sample_profile(Gender::Male);
        let input = PreferenceInput {
            min_age: Some(19),
            ..empty_input()
        };
        let err = build_preference(&profile, &input, at(2025, 1, 1)).unwrap_err();
        match err {
            AppError::Known { code, .. } => assert_eq!(code, ErrorCode::InvalidAgeBounds),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
