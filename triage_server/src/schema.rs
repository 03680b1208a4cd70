//! Diesel table definitions for report triage.
//!
//! Tables: apps, breakage_categories, operating_systems, bug_providers, bugs,
//! buckets, report_entries, bucket_hits.

diesel::table! {
    apps (id) {
        id -> Int8,
        channel -> Nullable<Varchar>,
        name -> Varchar,
        version -> Varchar,
    }
}

diesel::table! {
    breakage_categories (id) {
        id -> Int8,
        value -> Varchar,
    }
}

diesel::table! {
    operating_systems (id) {
        id -> Int8,
        name -> Varchar,
    }
}

diesel::table! {
    bug_providers (id) {
        id -> Int8,
        classname -> Varchar,
        hostname -> Varchar,
        url_template -> Varchar,
    }
}

diesel::table! {
    bugs (id) {
        id -> Int8,
        external_id -> Varchar,
        provider_id -> Int8,
        closed -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    buckets (id) {
        id -> Int8,
        bug_id -> Nullable<Int8>,
        description -> Text,
        domain -> Nullable<Varchar>,
        hide_until -> Nullable<Timestamptz>,
        priority -> Int4,
        signature -> Text,
        reassign_in_progress -> Bool,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    report_entries (id) {
        id -> Int8,
        app_id -> Int8,
        breakage_category_id -> Nullable<Int8>,
        bucket_id -> Nullable<Int8>,
        comments -> Text,
        comments_translated -> Nullable<Text>,
        comments_original_language -> Nullable<Text>,
        details -> Jsonb,
        os_id -> Int8,
        reported_at -> Timestamptz,
        url -> Varchar,
        uuid -> Uuid,
        ml_valid_probability -> Nullable<Float8>,
        create_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    bucket_hits (id) {
        id -> Int8,
        bucket_id -> Int8,
        begin_at -> Timestamptz,
        count -> Int4,
    }
}

diesel::joinable!(bugs -> bug_providers (provider_id));
diesel::joinable!(buckets -> bugs (bug_id));
diesel::joinable!(report_entries -> apps (app_id));
diesel::joinable!(report_entries -> breakage_categories (breakage_category_id));
diesel::joinable!(report_entries -> operating_systems (os_id));
diesel::joinable!(report_entries -> buckets (bucket_id));
diesel::joinable!(bucket_hits -> buckets (bucket_id));

diesel::allow_tables_to_appear_in_same_query!(
    apps,
    breakage_categories,
    operating_systems,
    bug_providers,
    bugs,
    buckets,
    report_entries,
    bucket_hits,
);
