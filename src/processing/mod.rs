//! Processing: compositing and post-recording editing
//!
//! The compositor draws each recorded frame; the media player, duration
//! prober and trimmer operate on finished recordings.

pub mod compositor;
pub mod duration;
pub mod media;
pub mod surface;
pub mod trim;

pub use compositor::{AreaCrop, Compositor, OverlayLayout};
pub use duration::DurationProber;
pub use media::{FfmpegMediaLoader, FfmpegPlayer, MediaLoader, MediaPlayer};
pub use surface::Surface;
pub use trim::{format_time, TrimEditor, TrimRange, Trimmer};
