//! Diesel schema for backlog persistence.

diesel::table! {
    /// Imported backlog lines awaiting or undergoing the daily drip.
    backlog_items (id) {
        /// Internal item identifier.
        id -> Uuid,
        /// Import sequence; breaks ties between items imported together.
        seq -> Int8,
        /// Line text.
        raw_text -> Text,
        /// Import label.
        #[max_length = 255]
        source -> Varchar,
        /// Drip status.
        #[max_length = 50]
        status -> Varchar,
        /// Import timestamp.
        imported_at -> Timestamptz,
        /// Claim timestamp.
        claimed_at -> Nullable<Timestamptz>,
        /// Resolution timestamp.
        processed_at -> Nullable<Timestamptz>,
        /// Derived capture.
        capture_id -> Nullable<Uuid>,
        /// Clarification attempts of the derived capture at resolution.
        clarify_attempts -> Int4,
        /// Error propagated from the derived capture.
        last_error -> Nullable<Text>,
        /// Optimistic concurrency version.
        version -> Int8,
    }
}
