//! `PostgreSQL` adapters for the remote task cache.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresTaskCache, TaskCachePgPool};
