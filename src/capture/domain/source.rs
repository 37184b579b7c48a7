//! Capture origin metadata and remote task references.

use super::CaptureDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a capture came from.
///
/// The pair of `kind` and `source_id` identifies an originating message;
/// ingestion is idempotent on that pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureSource {
    kind: String,
    source_id: Option<String>,
    link: Option<String>,
}

impl CaptureSource {
    /// Source kind used for captures derived from backlog items.
    pub const BACKLOG: &'static str = "backlog";

    /// Source kind used for captures pulled from the inbox.
    pub const EMAIL: &'static str = "email";

    /// Creates a source of the given kind without an originating identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::EmptySourceKind`] when `kind` is blank.
    pub fn new(kind: impl Into<String>) -> Result<Self, CaptureDomainError> {
        let raw = kind.into();
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(CaptureDomainError::EmptySourceKind);
        }
        Ok(Self {
            kind: normalized,
            source_id: None,
            link: None,
        })
    }

    /// Sets the originating message identifier.
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        let value = source_id.into();
        let trimmed = value.trim();
        self.source_id = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        self
    }

    /// Sets a link back to the originating message.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Returns the source kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the originating message identifier, if any.
    #[must_use]
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Returns the link back to the originating message, if any.
    #[must_use]
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_id {
            Some(source_id) => write!(f, "{}:{source_id}", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

/// Identifiers of a task in the remote task manager.
///
/// RTM addresses a task by list, task series and task identifiers; all three
/// are needed to modify it later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTaskRef {
    /// Remote task identifier.
    pub task_id: String,
    /// Remote task series identifier.
    pub taskseries_id: String,
    /// Remote list identifier.
    pub list_id: String,
}

impl RemoteTaskRef {
    /// Creates a remote task reference.
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        taskseries_id: impl Into<String>,
        list_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            taskseries_id: taskseries_id.into(),
            list_id: list_id.into(),
        }
    }
}

impl fmt::Display for RemoteTaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.list_id, self.taskseries_id, self.task_id)
    }
}
