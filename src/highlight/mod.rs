//! Remote task cache and the daily highlight suggester.
//!
//! The cache mirrors the remote task list through periodic sync pulls. The
//! suggester reads lonely actions (open tasks outside any project) from it
//! and picks a few to highlight, spacing out repeats so the same task does
//! not nag.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
