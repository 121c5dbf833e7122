//! Command handlers
//!
//! The boundary the orchestration layer calls into. Every handler returns
//! `Result<_, String>` with a human-readable message on failure.

pub mod processing;
pub mod recording;
