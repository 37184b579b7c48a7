//! Unit tests for the backlog module.
