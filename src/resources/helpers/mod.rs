//! Shared helpers for resource implementations.
pub mod cmd;
pub mod fs;
