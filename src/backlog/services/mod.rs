//! Application services for the backlog drip.

mod drip;
mod import;

pub use drip::{
    BacklogSummary, DailyQuota, DripConfig, DripError, DripImporter, DripReport, DripResult,
};
pub use import::{BacklogImportService, ImportError, ImportReport, ImportResult};
