// Mirrors the DDL in `db::SCHEMA`.

diesel::table! {
    logs (id) {
        id -> BigInt,
        log_type -> Text,
        message -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    processed_events (event_id) {
        event_id -> Text,
        subject -> Text,
        organizer -> Text,
        start_time -> Text,
        end_time -> Text,
        event_date -> Text,
        location -> Text,
        processed_time -> Timestamp,
        created_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(logs, processed_events,);
