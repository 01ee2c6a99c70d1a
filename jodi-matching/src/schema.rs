// Hand-maintained diesel schema for the matching service.

diesel::table! {
    profiles (id) {
        id -> Uuid,
        #[max_length = 64]
        chat_handle -> Varchar,
        #[max_length = 100]
        full_name -> Varchar,
        gender -> Int2,
        dob -> Date,
        religion -> Int2,
        caste_id -> Nullable<Int4>,
        city_id -> Nullable<Int4>,
        marital_status -> Int2,
        annual_income -> Nullable<Int2>,
        deactivated_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    partner_preferences (profile_id) {
        profile_id -> Uuid,
        min_age -> Int4,
        max_age -> Int4,
        religions -> Nullable<Array<Int2>>,
        caste_ids -> Nullable<Array<Int4>>,
        marital_statuses -> Nullable<Array<Int2>>,
        min_income -> Nullable<Int2>,
        city_ids -> Nullable<Array<Int4>>,
        state_ids -> Nullable<Array<Int4>>,
        country_ids -> Nullable<Array<Int4>>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    pairings (male_profile_id, female_profile_id) {
        male_profile_id -> Uuid,
        female_profile_id -> Uuid,
        delivery_status -> Int2,
        created_at -> Timestamptz,
        claimed_at -> Nullable<Timestamptz>,
        delivered_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    castes (id) {
        id -> Int4,
        religion -> Int2,
        #[max_length = 100]
        name -> Varchar,
    }
}

diesel::table! {
    countries (id) {
        id -> Int4,
        #[max_length = 100]
        name -> Varchar,
    }
}

diesel::table! {
    states (id) {
        id -> Int4,
        country_id -> Int4,
        #[max_length = 100]
        name -> Varchar,
    }
}

diesel::table! {
    cities (id) {
        id -> Int4,
        state_id -> Int4,
        // Denormalized so location filters only ever join one table.
        country_id -> Int4,
        #[max_length = 100]
        name -> Varchar,
    }
}

diesel::joinable!(partner_preferences -> profiles (profile_id));
diesel::joinable!(profiles -> castes (caste_id));
diesel::joinable!(profiles -> cities (city_id));
diesel::joinable!(states -> countries (country_id));
diesel::joinable!(cities -> states (state_id));

diesel::allow_tables_to_appear_in_same_query!(
    profiles,
    partner_preferences,
    pairings,
    castes,
    countries,
    states,
    cities,
);
