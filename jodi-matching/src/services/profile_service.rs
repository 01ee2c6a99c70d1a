use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use jodi_shared::clients::db::DbPool;
use jodi_shared::errors::{AppError, AppResult, ErrorCode};
use jodi_shared::types::pagination::{PageParams, Paged};

use crate::models::{
    age_in_years, AnnualIncome, Caste, DeliveryStatus, Gender, MaritalStatus, NewProfile, Profile,
    Religion,
};
use crate::schema::{castes, cities, pairings, profiles};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProfileRequest {
    #[validate(length(min = 3, max = 64))]
    pub chat_handle: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    pub gender: Gender,
    pub dob: NaiveDate,
    pub religion: Religion,
    pub caste_id: Option<i32>,
    pub city_id: Option<i32>,
    pub marital_status: MaritalStatus,
    pub annual_income: Option<AnnualIncome>,
}

pub fn create_profile(pool: &DbPool, request: CreateProfileRequest) -> AppResult<Profile> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let today = Utc::now().date_naive();
    let age = age_in_years(request.dob, today);
    let floor = request.gender.legal_min_age();
    if age < floor {
        return Err(AppError::Validation(format!(
            "profile must be at least {floor} years old"
        )));
    }

    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;

    if let Some(caste_id) = request.caste_id {
        let caste = castes::table
            .find(caste_id)
            .first::<Caste>(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::CasteNotFound, "unknown caste id"))?;
        if caste.religion != request.religion {
            return Err(AppError::Validation(
                "caste does not belong to the given religion".to_string(),
            ));
        }
    }

    if let Some(city_id) = request.city_id {
        let exists = diesel::select(diesel::dsl::exists(
            cities::table.filter(cities::id.eq(city_id)),
        ))
        .get_result::<bool>(&mut conn)?;
        if !exists {
            return Err(AppError::new(ErrorCode::CityNotFound, "unknown city id"));
        }
    }

    let row = NewProfile {
        id: Uuid::now_v7(),
        chat_handle: request.chat_handle,
        full_name: request.full_name,
        gender: request.gender,
        dob: request.dob,
        religion: request.religion,
        caste_id: request.caste_id,
        city_id: request.city_id,
        marital_status: request.marital_status,
        annual_income: request.annual_income,
    };

    let profile = diesel::insert_into(profiles::table)
        .values(&row)
        .returning(Profile::as_returning())
        .get_result::<Profile>(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::new(
                    ErrorCode::DuplicateProfile,
                    "a profile with this chat handle already exists",
                )
            }
            other => other.into(),
        })?;

    tracing::info!(profile_id = %profile.id, "profile created");
    Ok(profile)
}

pub fn get_profile(pool: &DbPool, profile_id: Uuid) -> AppResult<Profile> {
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;
    profiles::table
        .find(profile_id)
        .first::<Profile>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))
}

pub fn list_profiles(pool: &DbPool, page: PageParams) -> AppResult<Paged<Profile>> {
    page.validate()?;
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;

    let total: i64 = profiles::table.count().get_result(&mut conn)?;
    let items = profiles::table
        .order(profiles::id.asc())
        .offset(page.skip)
        .limit(page.take)
        .load::<Profile>(&mut conn)?;

    Ok(Paged::new(items, total))
}

/// Deactivates a profile and invalidates its pairings: undelivered ones
/// are removed outright, delivered and in-flight ones are soft-deleted
/// so delivery history survives.
pub fn deactivate_profile(pool: &DbPool, profile_id: Uuid) -> AppResult<Profile> {
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;

    conn.transaction::<Profile, AppError, _>(|conn| {
        let profile = diesel::update(
            profiles::table
                .find(profile_id)
                .filter(profiles::deactivated_at.is_null()),
        )
        .set(profiles::deactivated_at.eq(Utc::now()))
        .returning(Profile::as_returning())
        .get_result::<Profile>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::new(ErrorCode::ProfileNotFound, "profile not found or already deactivated")
        })?;

        let dropped = diesel::delete(
            pairings::table
                .filter(
                    pairings::male_profile_id
                        .eq(profile_id)
                        .or(pairings::female_profile_id.eq(profile_id)),
                )
                .filter(pairings::delivery_status.eq(DeliveryStatus::Undelivered)),
        )
        .execute(conn)?;

        let hidden = diesel::update(
            pairings::table
                .filter(
                    pairings::male_profile_id
                        .eq(profile_id)
                        .or(pairings::female_profile_id.eq(profile_id)),
                )
                .filter(pairings::deleted_at.is_null()),
        )
        .set(pairings::deleted_at.eq(Utc::now()))
        .execute(conn)?;

        tracing::info!(
            profile_id = %profile_id,
            dropped = dropped,
            hidden = hidden,
            "profile deactivated"
        );
        Ok(profile)
    })
}

pub fn reactivate_profile(pool: &DbPool, profile_id: Uuid) -> AppResult<Profile> {
    let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;

    let profile = diesel::update(
        profiles::table
            .find(profile_id)
            .filter(profiles::deactivated_at.is_not_null()),
    )
    .set(profiles::deactivated_at.eq(None::<chrono::DateTime<Utc>>))
    .returning(Profile::as_returning())
    .get_result::<Profile>(&mut conn)
    .optional()?
    .ok_or_else(|| {
        AppError::new(ErrorCode::ProfileNotFound, "profile not found or already active")
    })?;

    tracing::info!(profile_id = %profile_id, "profile reactivated");
    Ok(profile)
}
