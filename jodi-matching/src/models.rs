use chrono::{DateTime, Datelike, NaiveDate, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::SmallInt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

use crate::schema::{castes, cities, pairings, partner_preferences, profiles};

/// Smallint-coded domain enums. The numeric codes are part of the stored
/// data format and must not be reordered.
macro_rules! smallint_enum {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash,
            Serialize, Deserialize, AsExpression, FromSqlRow,
        )]
        #[diesel(sql_type = SmallInt)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn from_i16(value: i16) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn as_i16(self) -> i16 {
                self as i16
            }
        }

        impl ToSql<SmallInt, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(&(*self as i16).to_be_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<SmallInt, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let value = <i16 as FromSql<SmallInt, Pg>>::from_sql(bytes)?;
                Self::from_i16(value)
                    .ok_or_else(|| format!("invalid {} code: {value}", stringify!($name)).into())
            }
        }
    };
}

smallint_enum!(Gender {
    Male = 1,
    Female = 2,
});

impl Gender {
    pub fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }

    /// Legal minimum marriage age in the source domain.
    pub fn legal_min_age(self) -> i32 {
        match self {
            Gender::Male => 21,
            Gender::Female => 18,
        }
    }
}

smallint_enum!(Religion {
    Hindu = 1,
    JainDigamber = 2,
    JainShwetamber = 3,
    MuslimShia = 4,
    MuslimSunni = 5,
    Christian = 6,
    Sikh = 7,
});

smallint_enum!(MaritalStatus {
    NeverMarried = 1,
    Divorced = 2,
    Widowed = 3,
    Annulled = 4,
    AwaitingDivorce = 5,
});

// Bands are ordered, so the stored code doubles as a comparable floor.
smallint_enum!(AnnualIncome {
    Zero = 1,
    FiftyKOrMore = 2,
    OneLakhOrMore = 3,
    TwoLakhOrMore = 4,
    FiveLakhOrMore = 5,
    TenLakhOrMore = 6,
    TwentyLakhOrMore = 7,
    ThirtyFiveLakhOrMore = 8,
    FiftyLakhOrMore = 9,
    SeventyFiveLakhOrMore = 10,
    OneCroreOrMore = 11,
    FiveCroreOrMore = 12,
    TenCroreOrMore = 13,
});

smallint_enum!(DeliveryStatus {
    Undelivered = 1,
    // Claimed by a distribution run; released back to Undelivered if
    // either notifier direction fails.
    InFlight = 2,
    Delivered = 3,
});

// --- Profile ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = profiles)]
#[diesel(check_for_backend(Pg))]
pub struct Profile {
    pub id: Uuid,
    pub chat_handle: String,
    pub full_name: String,
    pub gender: Gender,
    pub dob: NaiveDate,
    pub religion: Religion,
    pub caste_id: Option<i32>,
    pub city_id: Option<i32>,
    pub marital_status: MaritalStatus,
    pub annual_income: Option<AnnualIncome>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn age_on(&self, date: NaiveDate) -> i32 {
        age_in_years(self.dob, date)
    }

    pub fn is_active(&self) -> bool {
        self.deactivated_at.is_none()
    }
}

pub fn age_in_years(dob: NaiveDate, on: NaiveDate) -> i32 {
    let mut age = on.year() - dob.year();
    if (on.month(), on.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: Uuid,
    pub chat_handle: String,
    pub full_name: String,
    pub gender: Gender,
    pub dob: NaiveDate,
    pub religion: Religion,
    pub caste_id: Option<i32>,
    pub city_id: Option<i32>,
    pub marital_status: MaritalStatus,
    pub annual_income: Option<AnnualIncome>,
}

// --- PartnerPreference ---

/// One row per profile, upserted wholesale on every save.
/// `None` set columns mean "no restriction"; an empty array is a
/// restriction that matches nothing.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize)]
#[diesel(table_name = partner_preferences)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(Pg))]
pub struct PartnerPreference {
    pub profile_id: Uuid,
    pub min_age: i32,
    pub max_age: i32,
    pub religions: Option<Vec<Religion>>,
    pub caste_ids: Option<Vec<i32>>,
    pub marital_statuses: Option<Vec<MaritalStatus>>,
    pub min_income: Option<AnnualIncome>,
    pub city_ids: Option<Vec<i32>>,
    pub state_ids: Option<Vec<i32>>,
    pub country_ids: Option<Vec<i32>>,
    pub updated_at: DateTime<Utc>,
}

// --- Pairing ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = pairings)]
#[diesel(primary_key(male_profile_id, female_profile_id))]
#[diesel(check_for_backend(Pg))]
pub struct Pairing {
    pub male_profile_id: Uuid,
    pub female_profile_id: Uuid,
    pub delivery_status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Pairing {
    /// Counterpart of `profile_id` within this pairing.
    pub fn counterpart_of(&self, profile_id: Uuid) -> Uuid {
        if self.male_profile_id == profile_id {
            self.female_profile_id
        } else {
            self.male_profile_id
        }
    }
}

/// The (male, female) tuple is the identity; delivery state and
/// timestamps take their column defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Insertable)]
#[diesel(table_name = pairings)]
pub struct NewPairing {
    pub male_profile_id: Uuid,
    pub female_profile_id: Uuid,
}

impl NewPairing {
    /// Orients a pairing as (male, female) regardless of which side the
    /// subject profile is on.
    pub fn oriented(subject: &Profile, counterpart_id: Uuid) -> Self {
        match subject.gender {
            Gender::Male => Self {
                male_profile_id: subject.id,
                female_profile_id: counterpart_id,
            },
            Gender::Female => Self {
                male_profile_id: counterpart_id,
                female_profile_id: subject.id,
            },
        }
    }
}

// --- Reference data ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = castes)]
#[diesel(check_for_backend(Pg))]
pub struct Caste {
    pub id: i32,
    pub religion: Religion,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = cities)]
#[diesel(check_for_backend(Pg))]
pub struct City {
    pub id: i32,
    pub state_id: i32,
    pub country_id: i32,
    pub name: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_completed_years_only() {
        assert_eq!(age_in_years(date(1995, 6, 15), date(2025, 6, 14)), 29);
        assert_eq!(age_in_years(date(1995, 6, 15), date(2025, 6, 15)), 30);
        assert_eq!(age_in_years(date(1995, 6, 15), date(2025, 6, 16)), 30);
    }

    #[test]
    fn enum_codes_round_trip() {
        assert_eq!(Religion::from_i16(Religion::Sikh.as_i16()), Some(Religion::Sikh));
        assert_eq!(MaritalStatus::from_i16(4), Some(MaritalStatus::Annulled));
        assert_eq!(DeliveryStatus::from_i16(42), None);
    }

    #[test]
    fn income_bands_are_ordered() {
        assert!(AnnualIncome::FiveLakhOrMore.as_i16() < AnnualIncome::TenLakhOrMore.as_i16());
    }

    #[test]
    fn counterpart_is_the_other_member() {
        let male = Uuid::new_v4();
        let female = Uuid::new_v4();
        let pairing = Pairing {
            male_profile_id: male,
            female_profile_id: female,
            delivery_status: DeliveryStatus::Undelivered,
            created_at: Utc::now(),
            claimed_at: None,
            delivered_at: None,
            deleted_at: None,
        };
        assert_eq!(pairing.counterpart_of(male), female);
        assert_eq!(pairing.counterpart_of(female), male);
    }

    #[test]
    fn pairing_orientation_is_gender_fixed() {
        let male = sample_profile(Gender::Male);
        let other = Uuid::new_v4();
        let row = NewPairing::oriented(&male, other);
        assert_eq!(row.male_profile_id, male.id);
        assert_eq!(row.female_profile_id, other);

        let female = sample_profile(Gender::Female);
        let row = NewPairing::oriented(&female, other);
        assert_eq!(row.male_profile_id, other);
        assert_eq!(row.female_profile_id, female.id);
    }

    pub(crate) fn sample_profile(gender: Gender) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            chat_handle: "handle".into(),
            full_name: "Test Person".into(),
            gender,
            dob: date(1995, 6, 15),
            religion: Religion::Hindu,
            caste_id: None,
            city_id: None,
            marital_status: MaritalStatus::NeverMarried,
            annual_income: None,
            deactivated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
