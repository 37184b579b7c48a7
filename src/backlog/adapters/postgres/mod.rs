//! `PostgreSQL` adapters for backlog persistence.

mod models;
mod repository;
mod schema;

pub use repository::{BacklogPgPool, PostgresBacklogRepository};
