//! Adapter implementations for capture persistence.

pub mod memory;
pub mod postgres;
