//! Adapter implementations for task cache ports.

pub mod memory;
pub mod postgres;
