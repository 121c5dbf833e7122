//! Recording pipeline
//!
//! Sources implement `VideoSource`; the pipeline composites them each tick
//! and feeds an `Encoder`. The coordinator owns the session lifecycle.

pub mod artifact;
pub mod channel;
pub mod coordinator;
pub mod encoder;
pub mod ffmpeg;
pub mod pipeline;
pub mod session;

pub use artifact::{export_file_name, handoff, ArtifactReceiver, ArtifactSender, RecordingArtifact};
pub use channel::{
    AudioTrack, CapturedFrame, RecordingError, RecordingResult, SourceKind, SourceProvider, VideoSource,
};
pub use coordinator::{RecordingCoordinator, SessionEvent, SessionStatus};
pub use encoder::{
    negotiate_codec, ChunkBuffer, EncodedChunk, Encoder, EncoderFactory, EncoderSettings, FrameClock,
    StreamDescriptor, VideoCodec,
};
pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderFactory};
pub use pipeline::{CompositorPipeline, FinishedRecording, PreparedRecording};
pub use session::{CaptureMode, CaptureSession, SessionOptions, SessionPhase, TerminationReason};
