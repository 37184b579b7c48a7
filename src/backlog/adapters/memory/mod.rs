//! In-memory backlog adapters.

mod backlog;

pub use backlog::InMemoryBacklogRepository;
