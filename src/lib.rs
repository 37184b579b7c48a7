//! Inbox relay: the capture lifecycle engine behind a personal task inbox.
//!
//! Raw captures arrive from an inbox feed or a drip-fed backlog, are
//! clarified by a language model into a next action or a project, wait for a
//! human decision, and are committed at most once to a remote task manager.
//! A separate cache of remote tasks feeds a daily highlight that avoids
//! nagging about the same task.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: aggregates and state transitions with no infrastructure
//!   dependencies
//! - **Ports**: trait interfaces for the store and external services
//! - **Adapters**: in-memory and `PostgreSQL` implementations of the ports
//! - **Services**: orchestrators that run one poll cycle at a time
//!
//! # Modules
//!
//! - [`capture`]: intake, clarification, review and commit of captures
//! - [`backlog`]: bulk backlog import and the daily drip into captures
//! - [`highlight`]: remote task cache and daily highlight suggestions
//! - [`runtime`]: poll loops and shutdown
//! - [`config`], [`telemetry`], [`clock`], [`retry`]: ambient concerns

pub mod backlog;
pub mod capture;
pub mod clock;
pub mod config;
pub mod highlight;
pub mod retry;
pub mod runtime;
pub mod telemetry;
