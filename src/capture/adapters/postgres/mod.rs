//! `PostgreSQL` adapters for capture persistence.

mod anchor_repository;
mod models;
mod repository;
mod schema;

pub use anchor_repository::PostgresAnchorRepository;
pub use repository::{CapturePgPool, PostgresCaptureRepository};
