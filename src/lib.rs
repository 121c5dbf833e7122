//! Open Screencast - screen recording with a webcam overlay and trimming.
//!
//! The library provides the capture sources, the compositing/encoding
//! pipeline, the session coordinator and the post-recording editor
//! (duration probing and trim re-encoding). The `open-screencast` binary
//! drives it from the command line.

pub mod capture;
pub mod commands;
pub mod config;
pub mod processing;
pub mod recorder;
pub mod utils;

pub use config::RecorderConfig;
pub use recorder::{RecordingError, RecordingResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "open_screencast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
