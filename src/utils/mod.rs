//! Shared utilities

pub mod ffmpeg;
