//! Bulk import of backlog lists.

use crate::backlog::{
    domain::{BacklogDomainError, BacklogItem},
    ports::{BacklogRepository, BacklogRepositoryError},
};
use crate::retry::{ContentionRetry, with_contention_retry};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for backlog import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// A line failed validation.
    #[error(transparent)]
    Domain(#[from] BacklogDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] BacklogRepositoryError),
}

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Outcome of one bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Items created.
    pub imported: usize,
    /// Blank lines skipped.
    pub skipped_empty: usize,
}

/// Turns multi-line text into pending backlog items.
#[derive(Clone)]
pub struct BacklogImportService<B, C>
where
    B: BacklogRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<B>,
    clock: Arc<C>,
    contention: ContentionRetry,
}

impl<B, C> BacklogImportService<B, C>
where
    B: BacklogRepository,
    C: Clock + Send + Sync,
{
    /// Creates an import service.
    #[must_use]
    pub fn new(repository: Arc<B>, clock: Arc<C>) -> Self {
        Self {
            repository,
            clock,
            contention: ContentionRetry::default(),
        }
    }

    /// Replaces the store contention retry settings.
    #[must_use]
    pub const fn with_contention(mut self, contention: ContentionRetry) -> Self {
        self.contention = contention;
        self
    }

    /// Imports one item per non-blank line of `text`, in line order.
    ///
    /// Lines are trimmed. Every item of one import shares the same import
    /// timestamp; the store keeps their line order.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Repository`] when the batch cannot be stored;
    /// nothing is imported in that case.
    pub async fn import_text(&self, text: &str, source: &str) -> ImportResult<ImportReport> {
        let mut report = ImportReport::default();
        let mut items = Vec::new();
        for line in text.lines() {
            match BacklogItem::new(line, source, &*self.clock) {
                Ok(item) => items.push(item),
                Err(BacklogDomainError::EmptyRawText) => report.skipped_empty += 1,
                Err(err) => return Err(err.into()),
            }
        }
        if items.is_empty() {
            return Ok(report);
        }

        let repository = &*self.repository;
        let batch = items.as_slice();
        with_contention_retry(self.contention, move || repository.store_all(batch)).await?;
        report.imported = items.len();
        tracing::info!(
            source,
            imported = report.imported,
            skipped_empty = report.skipped_empty,
            "backlog imported"
        );
        Ok(report)
    }
}
