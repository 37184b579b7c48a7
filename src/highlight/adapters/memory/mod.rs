//! In-memory task cache adapters.

mod task_cache;

pub use task_cache::InMemoryTaskCache;
