//! Encoder seam
//!
//! The compositor hands frames to an `Encoder` which periodically emits
//! opaque timestamped chunks. Chunks are accumulated strictly in arrival
//! order; concatenating them in that order is the only valid container.

use crate::capture::geometry::Resolution;
use crate::recorder::artifact::RecordingArtifact;
use crate::recorder::channel::{AudioTrack, RecordingError, RecordingResult};
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Video codecs the recorder can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp9,
    Vp8,
}

impl VideoCodec {
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
        }
    }

    /// Declared media type of containers produced with this codec
    pub fn media_type(&self, with_audio: bool) -> String {
        if with_audio {
            format!("video/webm;codecs={},opus", self.name())
        } else {
            format!("video/webm;codecs={}", self.name())
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncoderSettings {
    /// Codecs in preference order
    pub codecs: Vec<VideoCodec>,
    /// Nominal frame rate of the composited stream
    pub fps: u32,
    pub video_bits_per_second: u32,
    pub audio_bits_per_second: u32,
    /// Chunk emission period in milliseconds
    pub timeslice_ms: u64,
}

impl EncoderSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codecs: vec![VideoCodec::Vp9, VideoCodec::Vp8],
            fps: 30,
            video_bits_per_second: 5_000_000,
            audio_bits_per_second: 128_000,
            timeslice_ms: 1000,
        }
    }
}

/// The synthetic stream an encoder is started on
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub resolution: Resolution,
    pub fps: u32,
    pub audio: Option<AudioTrack>,
}

/// An opaque timestamped slice of the output container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Milliseconds since the encoder started
    pub timestamp_ms: u64,
    pub data: Vec<u8>,
}

impl EncodedChunk {
    pub fn new(timestamp_ms: u64, data: Vec<u8>) -> Self {
        Self { timestamp_ms, data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Converts a live frame stream into compressed chunks
#[async_trait]
pub trait Encoder: Send {
    fn codec(&self) -> VideoCodec;

    /// Start encoding the given stream
    async fn start(&mut self, stream: &StreamDescriptor) -> RecordingResult<()>;

    /// Feed one composited frame. `timestamp` is its presentation time
    /// relative to the first frame; gaps between timestamps are real time
    /// the output must still cover.
    async fn write_frame(&mut self, frame: &RgbaImage, timestamp: Duration) -> RecordingResult<()>;

    /// Emit whatever has been encoded since the last request
    async fn request_data(&mut self) -> RecordingResult<Option<EncodedChunk>>;

    /// Flush and finalize, returning any trailing chunks
    async fn finish(&mut self) -> RecordingResult<Vec<EncodedChunk>>;

    /// Tear down without finalizing
    async fn abort(&mut self);
}

/// Creates encoders and reports codec capability
pub trait EncoderFactory: Send + Sync {
    fn supports(&self, codec: VideoCodec) -> bool;

    fn create(&self, codec: VideoCodec, settings: &EncoderSettings) -> RecordingResult<Box<dyn Encoder>>;
}

/// Pick the first codec in preference order the factory supports
pub fn negotiate_codec(factory: &dyn EncoderFactory, preferred: &[VideoCodec]) -> RecordingResult<VideoCodec> {
    for codec in preferred {
        if factory.supports(*codec) {
            return Ok(*codec);
        }
        tracing::debug!("Codec {} not supported, trying next", codec);
    }

    Err(RecordingError::EncodingError(format!(
        "None of the preferred codecs are supported: {:?}",
        preferred
    )))
}

/// Maps presentation timestamps onto a constant-rate frame sequence.
///
/// A frame arriving after one or more missed slots is repeated to fill
/// them, so the frame count tracks elapsed time rather than the number of
/// frames delivered. A frame arriving before its slot is dropped.
#[derive(Debug, Clone)]
pub struct FrameClock {
    fps: u32,
    emitted: u64,
}

impl FrameClock {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            emitted: 0,
        }
    }

    /// How many copies of the frame stamped `timestamp` to emit
    pub fn copies_for(&mut self, timestamp: Duration) -> u64 {
        let slot = (timestamp.as_secs_f64() * self.fps as f64).round() as u64;
        let copies = (slot + 1).saturating_sub(self.emitted);
        self.emitted += copies;
        copies
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Accumulates encoder output in arrival order
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<EncodedChunk>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; empty chunks are dropped
    pub fn push(&mut self, chunk: EncodedChunk) {
        if chunk.is_empty() {
            return;
        }
        tracing::debug!(
            "Chunk {} received: {} bytes at {}ms",
            self.chunks.len(),
            chunk.data.len(),
            chunk.timestamp_ms
        );
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum()
    }

    pub fn chunks(&self) -> &[EncodedChunk] {
        &self.chunks
    }

    /// Concatenate the chunks into the finished container
    pub fn into_artifact(self, media_type: impl Into<String>) -> RecordingArtifact {
        let mut bytes = Vec::with_capacity(self.total_bytes());
        for chunk in self.chunks {
            bytes.extend_from_slice(&chunk.data);
        }
        RecordingArtifact::new(bytes, media_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnlyVp8;

    impl EncoderFactory for OnlyVp8 {
        fn supports(&self, codec: VideoCodec) -> bool {
            codec == VideoCodec::Vp8
        }

        fn create(&self, _codec: VideoCodec, _settings: &EncoderSettings) -> RecordingResult<Box<dyn Encoder>> {
            Err(RecordingError::EncodingError("not used".to_string()))
        }
    }

    #[test]
    fn test_negotiation_falls_back() {
        let codec = negotiate_codec(&OnlyVp8, &[VideoCodec::Vp9, VideoCodec::Vp8]).unwrap();
        assert_eq!(codec, VideoCodec::Vp8);
    }

    #[test]
    fn test_negotiation_fails_without_support() {
        assert!(negotiate_codec(&OnlyVp8, &[VideoCodec::Vp9]).is_err());
    }

    #[test]
    fn test_media_type() {
        assert_eq!(VideoCodec::Vp9.media_type(true), "video/webm;codecs=vp9,opus");
        assert_eq!(VideoCodec::Vp8.media_type(false), "video/webm;codecs=vp8");
    }

    #[test]
    fn test_chunk_buffer_skips_empty_and_keeps_order() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(EncodedChunk::new(1000, b"head".to_vec()));
        buffer.push(EncodedChunk::new(2000, Vec::new()));
        buffer.push(EncodedChunk::new(3000, b"-body".to_vec()));
        buffer.push(EncodedChunk::new(4000, b"-tail".to_vec()));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_bytes(), 14);

        let artifact = buffer.into_artifact("video/webm");
        assert_eq!(artifact.bytes(), b"head-body-tail");
        assert_eq!(artifact.media_type(), "video/webm");
    }

    #[test]
    fn test_frame_clock_fills_missed_slots() {
        let mut clock = FrameClock::new(30);
        let ms = Duration::from_millis;

        assert_eq!(clock.copies_for(ms(0)), 1);
        assert_eq!(clock.copies_for(ms(33)), 1);
        // 100ms stall: slots 2 and 3 were missed
        assert_eq!(clock.copies_for(ms(133)), 3);
        // Same slot again
        assert_eq!(clock.copies_for(ms(140)), 0);
        assert_eq!(clock.emitted(), 5);
    }

    #[test]
    fn test_frame_clock_tracks_wall_time_at_low_delivery_rate() {
        let mut clock = FrameClock::new(30);
        // 20 frames per second delivered for 10 seconds
        let total: u64 = (0..=200)
            .map(|i| clock.copies_for(Duration::from_millis(i * 50)))
            .sum();
        assert_eq!(total, 301);
    }

    #[test]
    fn test_frame_interval_and_timeslice() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.timeslice(), Duration::from_secs(1));
        assert!((settings.frame_interval().as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }
}
