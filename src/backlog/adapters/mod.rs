//! Adapter implementations for backlog ports.

pub mod memory;
pub mod postgres;
