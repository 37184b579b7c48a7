//! Capture lifecycle: intake, clarification, review and commit.
//!
//! A capture is one raw idea that is clarified by an external model,
//! approved or rejected by a human, and committed at most once to the remote
//! task manager. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
