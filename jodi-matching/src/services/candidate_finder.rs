use chrono::{Datelike, NaiveDate, Utc};
use diesel::dsl::sql;
use diesel::helper_types::{AsSelect, IntoBoxed, LeftJoin, Select};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use uuid::Uuid;

use jodi_shared::clients::db::DbPool;
use jodi_shared::errors::{AppError, AppResult, ErrorCode};
use jodi_shared::types::pagination::{PageParams, Paged};

use crate::models::{City, Gender, MaritalStatus, PartnerPreference, Profile};
use crate::schema::{cities, partner_preferences, profiles};

/// A profile's preference with every unset field resolved, ready to be
/// turned into query predicates. Pure data, no hidden defaults: a
/// profile without a stored preference row resolves to gender-derived
/// age bounds and no other restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPreference {
    pub min_age: i32,
    pub max_age: i32,
    pub religions: Option<Vec<crate::models::Religion>>,
    pub caste_ids: Option<Vec<i32>>,
    pub marital_statuses: Option<Vec<MaritalStatus>>,
    pub min_income: Option<crate::models::AnnualIncome>,
    pub city_ids: Option<Vec<i32>>,
    pub state_ids: Option<Vec<i32>>,
    pub country_ids: Option<Vec<i32>>,
}

impl ResolvedPreference {
    pub fn resolve(profile: &Profile, stored: Option<&PartnerPreference>, today: NaiveDate) -> Self {
        match stored {
            Some(pref) => Self {
                min_age: pref.min_age,
                max_age: pref.max_age,
                religions: pref.religions.clone(),
                caste_ids: pref.caste_ids.clone(),
                marital_statuses: pref.marital_statuses.clone(),
                min_income: pref.min_income,
                city_ids: pref.city_ids.clone(),
                state_ids: pref.state_ids.clone(),
                country_ids: pref.country_ids.clone(),
            },
            None => {
                let (min_age, max_age) =
                    resolve_age_bounds(profile.gender, profile.age_on(today), None, None);
                Self {
                    min_age,
                    max_age,
                    religions: None,
                    caste_ids: None,
                    marital_statuses: None,
                    min_income: None,
                    city_ids: None,
                    state_ids: None,
                    country_ids: None,
                }
            }
        }
    }
}

/// Resolves age bounds from explicit input and gender-derived defaults:
/// an unset minimum is age-6 (male) or age-1 (female), an unset maximum
/// age+1 (male) or age+6 (female). The minimum is floored at the legal
/// marriage age and the maximum never drops below the minimum.
pub fn resolve_age_bounds(
    gender: Gender,
    age: i32,
    min_age: Option<i32>,
    max_age: Option<i32>,
) -> (i32, i32) {
    let min_age = min_age.unwrap_or(match gender {
        Gender::Male => age - 6,
        Gender::Female => age - 1,
    });
    let max_age = max_age.unwrap_or(match gender {
        Gender::Male => age + 1,
        Gender::Female => age + 6,
    });

    let min_age = min_age.max(gender.legal_min_age());
    let max_age = max_age.max(min_age);
    (min_age, max_age)
}

/// `date` shifted `years` back, pinning Feb 29 to Feb 28 off leap years.
pub fn years_before(date: NaiveDate, years: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year() - years, date.month(), date.day())
        .unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(date.year() - years, 2, 28).expect("Feb 28 always exists")
        })
}

type CandidateJoin = LeftJoin<LeftJoin<profiles::table, partner_preferences::table>, cities::table>;
type BoxedCandidatePage<'a> = IntoBoxed<'a, Select<CandidateJoin, AsSelect<Profile, Pg>>, Pg>;

/// Applies the reciprocal compatibility filters to a boxed candidate
/// query. A macro rather than a function so the same predicate set can
/// serve both the page query and the count query, which box to
/// different select types.
macro_rules! candidate_filters {
    ($query:expr, $profile:expr, $pref:expr, $own_city:expr, $today:expr) => {{
        let profile: &Profile = $profile;
        let pref: &ResolvedPreference = $pref;
        let own_city: Option<&City> = $own_city;
        let today: NaiveDate = $today;
        let mut query = $query;

        query = query
            .filter(profiles::gender.eq(profile.gender.opposite()))
            .filter(profiles::deactivated_at.is_null())
            .filter(profiles::id.ne(profile.id));

        // Marital status: a stated preference filters; the unset case is
        // handled as a soft rank at order time and never excludes anyone.
        if let Some(statuses) = &pref.marital_statuses {
            query = query.filter(profiles::marital_status.eq_any(statuses.clone()));
        }
        query = query.filter(
            partner_preferences::marital_statuses
                .is_null()
                .or(partner_preferences::marital_statuses
                    .overlaps_with(vec![profile.marital_status])),
        );

        if let Some(religions) = &pref.religions {
            query = query.filter(profiles::religion.eq_any(religions.clone()));
        }
        query = query.filter(
            partner_preferences::religions
                .is_null()
                .or(partner_preferences::religions.overlaps_with(vec![profile.religion])),
        );

        // An empty caste set is a deliberate restriction that matches
        // nothing; only a NULL column means "no restriction".
        if let Some(caste_ids) = &pref.caste_ids {
            query = query.filter(profiles::caste_id.eq_any(caste_ids.clone()));
        }
        if let Some(own_caste) = profile.caste_id {
            query = query.filter(
                partner_preferences::caste_ids
                    .is_null()
                    .or(partner_preferences::caste_ids.contains(vec![own_caste])),
            );
        }

        let newest_dob = years_before(today, pref.min_age);
        let oldest_dob = years_before(today, pref.max_age + 1);
        query = query
            .filter(profiles::dob.le(newest_dob))
            .filter(profiles::dob.gt(oldest_dob));

        let own_age = profile.age_on(today);
        query = query
            .filter(
                partner_preferences::min_age
                    .is_null()
                    .or(partner_preferences::min_age.le(own_age)),
            )
            .filter(
                partner_preferences::max_age
                    .is_null()
                    .or(partner_preferences::max_age.ge(own_age)),
            );

        if let Some(floor) = pref.min_income {
            query = query.filter(profiles::annual_income.ge(floor));
        }
        match profile.annual_income {
            Some(income) => {
                query = query.filter(
                    partner_preferences::min_income
                        .is_null()
                        .or(partner_preferences::min_income.le(income)),
                );
            }
            None => {
                query = query.filter(partner_preferences::min_income.is_null());
            }
        }

        if let Some(city_ids) = &pref.city_ids {
            query = query.filter(profiles::city_id.eq_any(city_ids.clone()));
        }
        if let Some(state_ids) = &pref.state_ids {
            query = query.filter(cities::state_id.eq_any(state_ids.clone()));
        }
        if let Some(country_ids) = &pref.country_ids {
            query = query.filter(cities::country_id.eq_any(country_ids.clone()));
        }
        match own_city {
            Some(city) => {
                query = query
                    .filter(
                        partner_preferences::city_ids
                            .is_null()
                            .or(partner_preferences::city_ids.contains(vec![city.id])),
                    )
                    .filter(
                        partner_preferences::state_ids
                            .is_null()
                            .or(partner_preferences::state_ids.contains(vec![city.state_id])),
                    )
                    .filter(
                        partner_preferences::country_ids
                            .is_null()
                            .or(partner_preferences::country_ids.contains(vec![city.country_id])),
                    );
            }
            None => {
                query = query
                    .filter(partner_preferences::city_ids.is_null())
                    .filter(partner_preferences::state_ids.is_null())
                    .filter(partner_preferences::country_ids.is_null());
            }
        }

        query
    }};
}

fn order_candidates<'a>(
    query: BoxedCandidatePage<'a>,
    profile: &Profile,
    pref: &ResolvedPreference,
) -> BoxedCandidatePage<'a> {
    // A stated marital preference already filtered; plain id order keeps
    // pagination deterministic.
    if pref.marital_statuses.is_some() {
        return query.order(profiles::id.asc());
    }

    let rank = sql::<Integer>(&format!(
        "CASE profiles.marital_status WHEN {} THEN 1 WHEN {} THEN 2 ELSE 9 END",
        MaritalStatus::NeverMarried.as_i16(),
        MaritalStatus::Annulled.as_i16(),
    ));

    if profile.marital_status == MaritalStatus::NeverMarried {
        query.order((rank.asc(), profiles::id.asc()))
    } else {
        query.order((rank.desc(), profiles::id.asc()))
    }
}

/// Returns one page of mutually-acceptable opposite-gender candidates
/// for `profile_id`, with the total count across all pages.
pub fn find_candidates(
    pool: &DbPool,
    profile_id: Uuid,
    page: PageParams,
) -> AppResult<Paged<Profile>> {
    page.validate()?;

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

    let stored = partner_preferences::table
        .find(profile_id)
        .first::<PartnerPreference>(&mut conn)
        .optional()?;

    let own_city = match profile.city_id {
        Some(city_id) => cities::table.find(city_id).first::<City>(&mut conn).optional()?,
        None => None,
    };

    let today = Utc::now().date_naive();
    let pref = ResolvedPreference::resolve(&profile, stored.as_ref(), today);

    let total: i64 = candidate_filters!(
        profiles::table
            .left_join(partner_preferences::table)
            .left_join(cities::table)
            .count()
            .into_boxed(),
        &profile,
        &pref,
        own_city.as_ref(),
        today
    )
    .get_result(&mut conn)?;

    let page_query = candidate_filters!(
        profiles::table
            .left_join(partner_preferences::table)
            .left_join(cities::table)
            .select(Profile::as_select())
            .into_boxed(),
        &profile,
        &pref,
        own_city.as_ref(),
        today
    );

    let items = order_candidates(page_query, &profile, &pref)
        .offset(page.skip)
        .limit(page.take)
        .load::<Profile>(&mut conn)?;

    tracing::debug!(
        profile_id = %profile_id,
        total = total,
        page_len = items.len(),
        "candidate query complete"
    );

    Ok(Paged::new(items, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{date, sample_profile};
    use crate::models::Religion;

    #[test]
    fn male_defaults_span_six_below_one_above() {
        assert_eq!(resolve_age_bounds(Gender::Male, 30, None, None), (24, 31));
    }

    #[test]
    fn female_defaults_floor_at_legal_minimum() {
        assert_eq!(resolve_age_bounds(Gender::Female, 25, None, None), (24, 31));
        // Young enough that the derived minimum falls below the floor.
        assert_eq!(resolve_age_bounds(Gender::Female, 18, None, None), (18, 24));
        assert_eq!(resolve_age_bounds(Gender::Male, 21, None, None), (21, 22));
    }

    #[test]
    fn explicit_bounds_win_but_stay_floored() {
        assert_eq!(resolve_age_bounds(Gender::Male, 30, Some(26), Some(35)), (26, 35));
        assert_eq!(resolve_age_bounds(Gender::Male, 30, Some(19), None), (21, 31));
    }

    #[test]
    fn max_never_drops_below_min() {
        assert_eq!(resolve_age_bounds(Gender::Female, 60, None, Some(20)), (59, 59));
    }

    #[test]
    fn years_before_handles_leap_day() {
        assert_eq!(years_before(date(2024, 2, 29), 1), date(2023, 2, 28));
        assert_eq!(years_before(date(2024, 2, 29), 4), date(2020, 2, 29));
    }

    #[test]
    fn missing_preference_resolves_to_defaults_only() {
        let profile = sample_profile(Gender::Male);
        let today = date(2025, 6, 15); // age 30
        let resolved = ResolvedPreference::resolve(&profile, None, today);
        assert_eq!((resolved.min_age, resolved.max_age), (24, 31));
        assert!(resolved.religions.is_none());
        assert!(resolved.caste_ids.is_none());
        assert!(resolved.marital_statuses.is_none());
    }

    // Mirrors the forward + reverse admission rules the query encodes,
    // for scenario tests that have no database.
    fn admits(pref: &ResolvedPreference, subject: &Profile, candidate: &Profile, today: NaiveDate) -> bool {
        let age = candidate.age_on(today);
        candidate.gender == subject.gender.opposite()
            && candidate.deactivated_at.is_none()
            && candidate.id != subject.id
            && (pref.min_age..=pref.max_age).contains(&age)
            && pref
                .religions
                .as_ref()
                .map(|set| set.contains(&candidate.religion))
                .unwrap_or(true)
            && pref
                .caste_ids
                .as_ref()
                .map(|set| candidate.caste_id.map(|c| set.contains(&c)).unwrap_or(false))
                .unwrap_or(true)
            && pref
                .marital_statuses
                .as_ref()
                .map(|set| set.contains(&candidate.marital_status))
                .unwrap_or(true)
    }

    #[test]
    fn hindu_same_caste_pair_admit_each_other() {
        let today = date(2025, 6, 15);
        let caste = 7;

        let mut groom = sample_profile(Gender::Male); // Hindu, never married, 30
        groom.caste_id = Some(caste);
        let mut bride = sample_profile(Gender::Female);
        bride.caste_id = Some(caste);
        bride.dob = date(1999, 6, 15); // 26

        let groom_pref = ResolvedPreference {
            religions: Some(vec![Religion::Hindu]),
            caste_ids: Some(vec![caste]),
            ..ResolvedPreference::resolve(&groom, None, today)
        };
        let bride_pref = ResolvedPreference {
            religions: Some(vec![Religion::Hindu]),
            caste_ids: Some(vec![caste]),
            ..ResolvedPreference::resolve(&bride, None, today)
        };

        assert!(admits(&groom_pref, &groom, &bride, today));
        assert!(admits(&bride_pref, &bride, &groom, today));

        // A different caste breaks admission in one direction only.
        let mut other = bride.clone();
        other.id = uuid::Uuid::new_v4();
        other.caste_id = Some(caste + 1);
        assert!(!admits(&groom_pref, &groom, &other, today));

        // A stated religion set excludes regardless of the candidate's
        // own preference.
        let sikh_only = ResolvedPreference {
            religions: Some(vec![Religion::Sikh]),
            caste_ids: None,
            ..groom_pref.clone()
        };
        assert!(!admits(&sikh_only, &groom, &bride, today));
    }

    #[test]
    fn stored_preference_passes_through_unchanged() {
        let profile = sample_profile(Gender::Female);
        let stored = PartnerPreference {
            profile_id: profile.id,
            min_age: 28,
            max_age: 34,
            religions: Some(vec![Religion::Sikh]),
            caste_ids: Some(vec![]),
            marital_statuses: None,
            min_income: None,
            city_ids: None,
            state_ids: None,
            country_ids: None,
            updated_at: chrono::Utc::now(),
        };
        let resolved = ResolvedPreference::resolve(&profile, Some(&stored), date(2025, 1, 1));
        assert_eq!((resolved.min_age, resolved.max_age), (28, 34));
        assert_eq!(resolved.religions, Some(vec![Religion::Sikh]));
        // Empty set stays an empty set, not "no restriction".
        assert_eq!(resolved.caste_ids, Some(vec![]));
    }
}
