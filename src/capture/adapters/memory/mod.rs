//! In-memory capture adapters for tests and embedding.

mod anchor;
mod capture;

pub use anchor::InMemoryAnchorRepository;
pub use capture::InMemoryCaptureRepository;
