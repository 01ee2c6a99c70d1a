//! Database fixtures for tests that exercise the pairing lifecycle
//! against a real Postgres. Tests are skipped when `DATABASE_URL` is
//! unset; rows use fresh uuids so runs never collide.

use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use uuid::Uuid;

use jodi_shared::clients::db::{create_pool, DbPool};

use crate::models::{
    DeliveryStatus, Gender, MaritalStatus, NewProfile, Pairing, Profile, Religion,
};
use crate::schema::{pairings, profiles};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

// Tests run in parallel; only one of them may apply migrations.
static MIGRATE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Pool against `DATABASE_URL` with migrations applied, or `None` so
/// the caller can skip when no database is available.
pub(crate) fn test_pool() -> Option<DbPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(&url);
    let mut conn = pool.get().expect("test database connection");
    let _guard = MIGRATE_LOCK.lock().unwrap();
    conn.run_pending_migrations(MIGRATIONS)
        .expect("test database migrations");
    Some(pool)
}

pub(crate) fn insert_profile(pool: &DbPool, gender: Gender) -> Profile {
    let mut conn = pool.get().expect("test database connection");
    let id = Uuid::new_v4();
    let row = NewProfile {
        id,
        chat_handle: format!("handle-{id}"),
        full_name: "Test Person".into(),
        gender,
        dob: NaiveDate::from_ymd_opt(1995, 6, 15).unwrap(),
        religion: Religion::Hindu,
        caste_id: None,
        city_id: None,
        marital_status: MaritalStatus::NeverMarried,
        annual_income: None,
    };
    diesel::insert_into(profiles::table)
        .values(&row)
        .execute(&mut conn)
        .expect("insert test profile");
    profiles::table
        .find(id)
        .first(&mut conn)
        .expect("load test profile")
}

pub(crate) fn insert_pairing(
    pool: &DbPool,
    male_profile_id: Uuid,
    female_profile_id: Uuid,
    status: DeliveryStatus,
) -> Pairing {
    let mut conn = pool.get().expect("test database connection");
    diesel::insert_into(pairings::table)
        .values((
            pairings::male_profile_id.eq(male_profile_id),
            pairings::female_profile_id.eq(female_profile_id),
            pairings::delivery_status.eq(status),
        ))
        .execute(&mut conn)
        .expect("insert test pairing");
    find_pairing(pool, male_profile_id, female_profile_id).expect("load test pairing")
}

pub(crate) fn find_pairing(
    pool: &DbPool,
    male_profile_id: Uuid,
    female_profile_id: Uuid,
) -> Option<Pairing> {
    let mut conn = pool.get().expect("test database connection");
    pairings::table
        .find((male_profile_id, female_profile_id))
        .first(&mut conn)
        .optional()
        .expect("load test pairing")
}
