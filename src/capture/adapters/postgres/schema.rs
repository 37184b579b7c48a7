//! Diesel schema for capture persistence.
//!
//! Column names are a stable contract shared with the review tooling.

diesel::table! {
    /// Capture records with clarification, decision and commit state.
    captures (id) {
        /// Internal capture identifier.
        id -> Uuid,
        /// Original capture text.
        raw_text -> Text,
        /// Source kind such as `email` or `backlog`.
        #[max_length = 50]
        source_kind -> Varchar,
        /// Originating message identifier.
        #[max_length = 255]
        source_id -> Nullable<Varchar>,
        /// Link back to the originating message.
        source_link -> Nullable<Text>,
        /// Clarification status.
        #[max_length = 50]
        clarify_status -> Varchar,
        /// Clarification attempts made.
        clarify_attempt_count -> Int4,
        /// Start of the latest clarification attempt.
        last_clarify_attempt_at -> Nullable<Timestamptz>,
        /// Structured clarification payload.
        clarify_result -> Nullable<Jsonb>,
        /// Latest clarification error.
        clarify_error -> Nullable<Text>,
        /// Review decision.
        #[max_length = 50]
        decision_status -> Varchar,
        /// Decision timestamp.
        decided_at -> Nullable<Timestamptz>,
        /// Reviewer notes.
        decision_notes -> Nullable<Text>,
        /// Commit status.
        #[max_length = 50]
        commit_status -> Varchar,
        /// Commit attempts made.
        commit_attempt_count -> Int4,
        /// Start of the latest commit attempt.
        last_commit_attempt_at -> Nullable<Timestamptz>,
        /// Latest commit error.
        commit_error_message -> Nullable<Text>,
        /// Remote task identifier.
        #[max_length = 64]
        rtm_task_id -> Nullable<Varchar>,
        /// Remote task series identifier.
        #[max_length = 64]
        rtm_taskseries_id -> Nullable<Varchar>,
        /// Remote list identifier.
        #[max_length = 64]
        rtm_list_id -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// Optimistic concurrency version.
        version -> Int8,
    }
}

diesel::table! {
    /// Daily reminder anchors.
    anchors (id) {
        /// Anchor identifier.
        id -> Uuid,
        /// Reminder kind.
        #[max_length = 50]
        kind -> Varchar,
        /// `active` or `expired`.
        #[max_length = 20]
        status -> Varchar,
        /// Last UTC day the anchor counts for.
        valid_until -> Date,
        /// Remote task progress.
        external_state -> Nullable<Jsonb>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// Optimistic concurrency version.
        version -> Int8,
    }
}
