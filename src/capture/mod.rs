//! Capture: geometry, area selection and live sources
//!
//! The geometry and selection code is pure; `ffmpeg` provides the live
//! screen and camera sources.

pub mod area;
pub mod ffmpeg;
pub mod geometry;

pub use area::{select_area, AreaSelector, PointerInput, SelectionError, SelectorState};
pub use ffmpeg::{FfmpegCaptureSource, FfmpegSourceProvider};
pub use geometry::{map_rectangle, Rectangle, Resolution, WebcamAnchor};
