//! Trim re-encoder
//!
//! Decodes a finished recording from `start` to `end`, redraws each frame on
//! a fresh surface and feeds it to a second encoder instance. A range that
//! covers the whole recording bypasses the re-encode and returns the
//! original artifact.

use crate::config::RecorderConfig;
use crate::processing::duration::DurationProber;
use crate::processing::media::{MediaLoader, MediaPlayer};
use crate::processing::surface::Surface;
use crate::recorder::artifact::RecordingArtifact;
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::recorder::encoder::{
    negotiate_codec, ChunkBuffer, Encoder, EncoderFactory, EncoderSettings, StreamDescriptor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Minimum length of a trim range in seconds when dragging handles
const MIN_TRIM_SECS: f64 = 1.0;

/// A `[start, end)` window over a recording, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    /// Validate `0 <= start < end <= duration`
    pub fn new(start: f64, end: f64, duration: f64) -> RecordingResult<Self> {
        let valid = start.is_finite() && end.is_finite() && 0.0 <= start && start < end && end <= duration;
        if !valid {
            return Err(RecordingError::ExportFailure(format!(
                "Invalid trim range {:.2}s..{:.2}s for a {:.2}s recording",
                start, end, duration
            )));
        }
        Ok(Self { start, end })
    }

    pub fn full(duration: f64) -> Self {
        Self { start: 0.0, end: duration }
    }

    /// True when the range spans the whole recording
    pub fn is_full(&self, duration: f64) -> bool {
        self.start <= 0.0 && self.end >= duration
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// Fraction of the range covered at `position`, clamped to [0, 1]
    pub fn progress(&self, position: f64) -> f64 {
        if self.span() <= 0.0 {
            return 1.0;
        }
        ((position - self.start) / self.span()).clamp(0.0, 1.0)
    }
}

/// Trim handle state for an editing surface
#[derive(Debug, Clone, PartialEq)]
pub struct TrimEditor {
    duration: f64,
    range: TrimRange,
}

impl TrimEditor {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            range: TrimRange::full(duration),
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn range(&self) -> TrimRange {
        self.range
    }

    pub fn is_full(&self) -> bool {
        self.range.is_full(self.duration)
    }

    /// Move the start handle; it stays at least a second before the end
    pub fn set_start(&mut self, seconds: f64) {
        self.range.start = seconds.min(self.range.end - MIN_TRIM_SECS).max(0.0);
    }

    /// Move the end handle; it stays at least a second after the start
    pub fn set_end(&mut self, seconds: f64) {
        self.range.end = seconds.min(self.duration).max(self.range.start + MIN_TRIM_SECS);
    }

    pub fn drag_start(&mut self, fraction: f64) {
        self.set_start(self.time_at(fraction));
    }

    pub fn drag_end(&mut self, fraction: f64) {
        self.set_end(self.time_at(fraction));
    }

    pub fn reset(&mut self) {
        self.range = TrimRange::full(self.duration);
    }

    /// Playback position for a click on the timeline, kept inside the range
    pub fn seek_target(&self, fraction: f64) -> f64 {
        self.time_at(fraction).max(self.range.start).min(self.range.end)
    }

    fn time_at(&self, fraction: f64) -> f64 {
        fraction.clamp(0.0, 1.0) * self.duration
    }
}

/// `MM:SS`; non-finite input renders as `00:00`
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let mins = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{:02}:{:02}", mins, secs)
}

pub struct Trimmer {
    loader: Arc<dyn MediaLoader>,
    encoders: Arc<dyn EncoderFactory>,
    prober: DurationProber,
    settings: EncoderSettings,
}

impl Trimmer {
    pub fn new(loader: Arc<dyn MediaLoader>, encoders: Arc<dyn EncoderFactory>, config: &RecorderConfig) -> Self {
        Self {
            loader,
            encoders,
            prober: DurationProber::new(config.probe.clone()),
            settings: config.encoder.clone(),
        }
    }

    /// Load the artifact and resolve its duration
    pub async fn probe_duration(&self, artifact: &RecordingArtifact) -> RecordingResult<f64> {
        let mut player = self.loader.load(artifact).await.map_err(export_failure)?;
        let duration = self.prober.resolve(player.as_mut()).await;
        player.close().await;
        Ok(duration)
    }

    /// Re-encode `range` of `artifact`, reporting progress in [0, 1].
    ///
    /// The original artifact is never modified; on failure it stays usable
    /// for another attempt.
    pub async fn trim<F>(
        &self,
        artifact: &RecordingArtifact,
        range: TrimRange,
        duration: f64,
        mut on_progress: F,
    ) -> RecordingResult<RecordingArtifact>
    where
        F: FnMut(f64) + Send,
    {
        if range.is_full(duration) {
            tracing::info!("Trim covers the whole recording, skipping re-encode");
            on_progress(1.0);
            return Ok(artifact.clone());
        }

        tracing::info!("Trimming {:.2}s..{:.2}s of {:.2}s", range.start, range.end, duration);

        let mut player = self.loader.load(artifact).await.map_err(export_failure)?;
        let result = self.reencode(player.as_mut(), range, &mut on_progress).await;
        player.close().await;

        result.map_err(export_failure)
    }

    async fn reencode<F>(
        &self,
        player: &mut dyn MediaPlayer,
        range: TrimRange,
        on_progress: &mut F,
    ) -> RecordingResult<RecordingArtifact>
    where
        F: FnMut(f64) + Send,
    {
        let size = player.native_size();
        let mut surface = Surface::new(size);

        let reached = player.seek(range.start).await?;
        tracing::debug!("Seeked to {:.3}s (requested {:.3}s)", reached, range.start);

        let codec = negotiate_codec(self.encoders.as_ref(), &self.settings.codecs)?;
        let mut encoder = self.encoders.create(codec, &self.settings)?;
        encoder
            .start(&StreamDescriptor {
                resolution: size,
                fps: self.settings.fps,
                audio: None,
            })
            .await?;

        let mut buffer = ChunkBuffer::new();
        let frames = match self
            .encode_range(player, encoder.as_mut(), &mut surface, range, &mut buffer, on_progress)
            .await
        {
            Ok(frames) => frames,
            Err(e) => {
                encoder.abort().await;
                return Err(e);
            }
        };

        for chunk in encoder.finish().await? {
            buffer.push(chunk);
        }

        tracing::info!(
            "Trim finished: {} frames, {} chunks, {} bytes",
            frames,
            buffer.len(),
            buffer.total_bytes()
        );

        Ok(buffer.into_artifact(codec.media_type(false)))
    }

    async fn encode_range<F>(
        &self,
        player: &mut dyn MediaPlayer,
        encoder: &mut dyn Encoder,
        surface: &mut Surface,
        range: TrimRange,
        buffer: &mut ChunkBuffer,
        on_progress: &mut F,
    ) -> RecordingResult<u64>
    where
        F: FnMut(f64) + Send,
    {
        let frame_rect = surface.size().as_rect();
        let frames_per_slice = (self.settings.fps as u64 * self.settings.timeslice_ms / 1000).max(1);
        let half_frame = 0.5 / self.settings.fps.max(1) as f64;
        let mut frames = 0u64;
        let mut skipped = 0u64;

        loop {
            let at = player.position();
            if at >= range.end {
                break;
            }
            let Some(frame) = player.next_frame().await? else {
                tracing::debug!("Playback stopped at {:.3}s", player.position());
                break;
            };

            // The seek may have landed on an earlier keyframe
            if at + half_frame < range.start {
                skipped += 1;
                continue;
            }
            if skipped > 0 {
                tracing::debug!("Dropped {} frames before {:.3}s", skipped, range.start);
                skipped = 0;
            }

            surface.draw_image(&frame.image, frame.resolution().as_rect(), frame_rect);
            let timestamp = Duration::from_secs_f64((at - range.start).max(0.0));
            encoder.write_frame(surface.image(), timestamp).await?;
            frames += 1;

            on_progress(range.progress(player.position()));

            if frames % frames_per_slice == 0 {
                if let Some(chunk) = encoder.request_data().await? {
                    buffer.push(chunk);
                }
            }
        }

        Ok(frames)
    }
}

fn export_failure(error: RecordingError) -> RecordingError {
    match error {
        RecordingError::ExportFailure(_) => error,
        other => RecordingError::ExportFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validation() {
        assert!(TrimRange::new(0.0, 10.0, 10.0).is_ok());
        assert!(TrimRange::new(5.0, 5.0, 10.0).is_err());
        assert!(TrimRange::new(-1.0, 5.0, 10.0).is_err());
        assert!(TrimRange::new(2.0, 11.0, 10.0).is_err());
        assert!(TrimRange::new(0.0, f64::NAN, 10.0).is_err());
    }

    #[test]
    fn test_progress_is_clamped() {
        let range = TrimRange { start: 10.0, end: 20.0 };
        assert_eq!(range.progress(5.0), 0.0);
        assert_eq!(range.progress(15.0), 0.5);
        assert_eq!(range.progress(25.0), 1.0);
    }

    #[test]
    fn test_editor_handles_keep_one_second_apart() {
        let mut editor = TrimEditor::new(60.0);
        assert!(editor.is_full());

        editor.set_end(10.0);
        editor.set_start(30.0);
        assert_eq!(editor.range(), TrimRange { start: 9.0, end: 10.0 });

        editor.set_end(2.0);
        assert_eq!(editor.range().end, 10.0);

        editor.set_start(-5.0);
        assert_eq!(editor.range().start, 0.0);
        assert!(!editor.is_full());
    }

    #[test]
    fn test_editor_drag_uses_timeline_fraction() {
        let mut editor = TrimEditor::new(40.0);
        editor.drag_start(0.25);
        editor.drag_end(1.5);
        assert_eq!(editor.range(), TrimRange { start: 10.0, end: 40.0 });

        assert_eq!(editor.seek_target(0.0), 10.0);
        assert_eq!(editor.seek_target(0.5), 20.0);

        editor.reset();
        assert!(editor.is_full());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(65.9), "01:05");
        assert_eq!(format_time(3599.0), "59:59");
        assert_eq!(format_time(f64::INFINITY), "00:00");
        assert_eq!(format_time(f64::NAN), "00:00");
    }
}
