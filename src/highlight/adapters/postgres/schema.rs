//! Diesel schema for the remote task cache.
//!
//! `times_suggested` and `last_suggested_at` are read by review tooling and
//! keep these names.

diesel::table! {
    /// Cached remote tasks with suggestion counters.
    rtm_task_cache (task_id) {
        /// Remote task identifier.
        #[max_length = 64]
        task_id -> Varchar,
        /// Remote task series identifier.
        #[max_length = 64]
        taskseries_id -> Varchar,
        /// Remote list identifier.
        #[max_length = 64]
        list_id -> Varchar,
        /// Task name.
        name -> Text,
        /// Remote creation timestamp.
        task_created_at -> Timestamptz,
        /// Owning project; `NULL` for a lonely action.
        #[max_length = 64]
        project_id -> Nullable<Varchar>,
        /// Completion flag.
        completed -> Bool,
        /// Remote tags.
        tags -> Array<Text>,
        /// Times the task was suggested.
        times_suggested -> Int4,
        /// Latest suggestion.
        last_suggested_at -> Nullable<Timestamptz>,
        /// Latest refresh that saw the task.
        last_synced_at -> Timestamptz,
        /// Optimistic concurrency version.
        version -> Int8,
    }
}
