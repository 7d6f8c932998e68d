//! Diesel schema, mirroring `migrations/2024-06-01-000000_init_schema/up.sql`.
//! Kept hand-written (not `diesel print-schema`) so the composite keys and the
//! `type` rename read the same as the migration they describe.

diesel::table! {
    collections (name) {
        name -> Text,
    }
}

diesel::table! {
    entries (collection, key) {
        collection -> Text,
        key -> Text,
        config -> Binary,
        value -> Nullable<Binary>,
        value_repr -> Nullable<Text>,
        created -> Nullable<Text>,
        executor -> Nullable<BigInt>,
    }
}

diesel::table! {
    deps (collection_s, key_s, collection_t, key_t) {
        collection_s -> Text,
        key_s -> Text,
        collection_t -> Text,
        key_t -> Text,
    }
}

diesel::table! {
    executors (id) {
        id -> BigInt,
        created -> Text,
        heartbeat -> Text,
        heartbeat_interval -> Double,
        stats -> Nullable<Text>,
        #[sql_name = "type"]
        type_ -> Text,
        version -> Text,
        resources -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(collections, entries, deps, executors,);
