//! Capture source seam
//!
//! Defines the error taxonomy shared by the whole recorder and the interface
//! every live source (screen, webcam) implements.

use crate::capture::area::SelectionError;
use crate::capture::geometry::Resolution;
use crate::recorder::session::CaptureMode;
use async_trait::async_trait;
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("User cancelled or no stream available")]
    NoStreamAvailable,

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("No active session")]
    NotRecording,

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Export failed: {0}")]
    ExportFailure(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// One decoded sample from a source
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// RGBA pixels
    pub image: Arc<RgbaImage>,

    /// Timestamp in milliseconds (source time)
    pub timestamp_ms: f64,
}

impl CapturedFrame {
    pub fn new(image: RgbaImage, timestamp_ms: f64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp_ms,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }
}

/// An audio track carried by a source, attached to the encoded stream as-is.
///
/// The track is described as an FFmpeg input so the encoder can pull it in
/// alongside the composited video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    /// Human readable label (device or monitor name)
    pub label: String,
    /// FFmpeg input format (`pulse`, `avfoundation`, `dshow`, ...)
    pub input_format: String,
    /// FFmpeg input specifier
    pub input: String,
}

/// Types of capture sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Screen/window capture
    Screen,
    /// Face camera
    Webcam,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Screen => write!(f, "screen"),
            SourceKind::Webcam => write!(f, "webcam"),
        }
    }
}

/// A live decodable frame producer.
///
/// Sources are owned exclusively by the compositor for the lifetime of a
/// session. `latest_frame` always returns the most recent decoded sample.
#[async_trait]
pub trait VideoSource: Send {
    /// Get the source identifier (e.g., "screen", "webcam")
    fn id(&self) -> &str;

    /// Get the source type
    fn kind(&self) -> SourceKind;

    /// Native frame size reported at acquisition
    fn native_size(&self) -> Resolution;

    /// Most recent decoded sample, if any has arrived yet
    fn latest_frame(&mut self) -> Option<CapturedFrame>;

    /// Hand over the source's audio track, if it carries one
    fn take_audio_track(&mut self) -> Option<AudioTrack>;

    /// True once the source signalled end of stream
    fn is_ended(&self) -> bool;

    /// Release the underlying device. Must be safe to call repeatedly.
    async fn stop(&mut self) -> RecordingResult<()>;
}

/// Acquires sources on behalf of the pipeline.
///
/// Acquisition is a suspension point: implementations may wait for a device
/// or a user consent prompt.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Acquire the face camera
    async fn acquire_camera(&self) -> RecordingResult<Box<dyn VideoSource>>;

    /// Acquire the screen or window, with its audio track when requested
    async fn acquire_screen(
        &self,
        mode: CaptureMode,
        with_audio: bool,
    ) -> RecordingResult<Box<dyn VideoSource>>;
}
