//! Application services for the task cache and highlight suggestions.

mod policy;
mod refresh;
mod suggester;

pub use policy::SuggestionPolicy;
pub use refresh::{CacheRefreshService, RefreshError, RefreshReport, RefreshResult};
pub use suggester::{HighlightSuggester, SuggestError, SuggestResult, SuggestionReport};
