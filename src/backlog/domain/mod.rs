//! Domain model for the backlog drip.

mod error;
mod ids;
mod item;
mod status;

pub use error::BacklogDomainError;
pub use ids::BacklogItemId;
pub use item::{BacklogItem, DERIVED_SOURCE_PREFIX, PersistedBacklogItemData};
pub use status::BacklogStatus;
