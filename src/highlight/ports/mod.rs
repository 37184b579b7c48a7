//! Port contracts for the task cache and highlight suggestions.

pub mod remote;
pub mod repository;

pub use remote::{HighlightPublisher, RemoteTaskError, RemoteTaskResult, RemoteTaskSource};
pub use repository::{TaskCacheError, TaskCacheRepository, TaskCacheResult};

#[cfg(test)]
pub use remote::{MockHighlightPublisher, MockRemoteTaskSource};
