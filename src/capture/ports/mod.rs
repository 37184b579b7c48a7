//! Port contracts for the capture lifecycle.
//!
//! Ports define infrastructure-agnostic interfaces used by capture services.

pub mod anchor_repository;
pub mod clarifier;
pub mod feed;
pub mod repository;
pub mod sync_client;

pub use anchor_repository::{AnchorRepository, AnchorRepositoryError, AnchorRepositoryResult};
pub use clarifier::{Clarifier, ClarifierResult, ClarifyError};
pub use feed::{CaptureFeed, CaptureFeedError, CaptureFeedResult, IncomingCapture};
pub use repository::{CaptureRepository, CaptureRepositoryError, CaptureRepositoryResult};
pub use sync_client::{CommitRequest, TaskSyncClient, TaskSyncError, TaskSyncResult};

#[cfg(test)]
pub use clarifier::MockClarifier;
#[cfg(test)]
pub use sync_client::MockTaskSyncClient;
