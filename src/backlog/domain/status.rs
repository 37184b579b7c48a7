//! Backlog item status.

use super::BacklogDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of a backlog item through the drip importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogStatus {
    /// Imported and waiting for a daily slot.
    Pending,
    /// Claimed; its derived capture is moving through the pipeline.
    Processing,
    /// The derived capture was committed.
    Processed,
    /// The derived capture ended in a terminal failure.
    Failed,
}

impl BacklogStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BacklogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for BacklogStatus {
    type Error = BacklogDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            _ => Err(BacklogDomainError::UnknownStatus(value.to_owned())),
        }
    }
}
