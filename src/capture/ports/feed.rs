//! Port for the inbox that delivers raw captures.

use crate::capture::domain::CaptureSource;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for capture feed operations.
pub type CaptureFeedResult<T> = Result<T, CaptureFeedError>;

/// One raw item delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCapture {
    /// Raw capture text.
    pub raw_text: String,
    /// Origin, including the originating message identifier.
    pub source: CaptureSource,
}

/// Source of raw captures, such as a mail folder.
#[async_trait]
pub trait CaptureFeed: Send + Sync {
    /// Returns items not yet acknowledged.
    async fn pull(&self) -> CaptureFeedResult<Vec<IncomingCapture>>;

    /// Marks an item as ingested so it is not delivered again.
    async fn acknowledge(&self, item: &IncomingCapture) -> CaptureFeedResult<()>;
}

/// Errors returned by capture feed adapters.
#[derive(Debug, Clone, Error)]
#[error("capture feed error: {0}")]
pub struct CaptureFeedError(Arc<dyn std::error::Error + Send + Sync>);

impl CaptureFeedError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}
