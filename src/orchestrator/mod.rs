//! Channel session orchestration.
//!
//! Covers the channel → session pool, the launcher that brings sessions
//! up, per-channel working directories and their retention sweep.

pub mod launcher;
pub mod pool;
pub mod retention;
pub mod workspace;
