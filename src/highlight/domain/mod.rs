//! Domain model for the remote task cache and highlight suggestions.

mod entry;

pub use entry::{PersistedCacheEntryData, RemoteTaskSnapshot, RtmTaskCacheEntry};

use thiserror::Error;

/// Errors returned while building cache entries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HighlightDomainError {
    /// The remote snapshot has no task identifier.
    #[error("remote task snapshot has no task identifier")]
    EmptyTaskId,
}
