//! Port contracts for the backlog drip.

pub mod repository;

pub use repository::{
    BacklogRepository, BacklogRepositoryError, BacklogRepositoryResult, BacklogStatusCounts,
};
