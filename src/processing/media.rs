//! Playback of finished recordings
//!
//! The trim re-encoder and the duration prober only need a seekable player
//! that yields frames at a fixed rate. `FfmpegPlayer` provides one by writing
//! the artifact to a temporary file and driving ffprobe/ffmpeg against it.

use crate::capture::geometry::Resolution;
use crate::recorder::artifact::RecordingArtifact;
use crate::recorder::channel::{CapturedFrame, RecordingError, RecordingResult};
use crate::utils::ffmpeg::{last_lines, tool_output, ProbeOutput};
use async_trait::async_trait;
use image::RgbaImage;
use std::io::Write;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// A seekable decoder over one loaded artifact
#[async_trait]
pub trait MediaPlayer: Send {
    /// Duration declared by the container; may be infinite or NaN
    fn declared_duration(&self) -> f64;

    fn native_size(&self) -> Resolution;

    /// Current playback position in seconds
    fn position(&self) -> f64;

    /// Seek to `seconds` and return the position actually reached
    async fn seek(&mut self, seconds: f64) -> RecordingResult<f64>;

    /// Decode the frame at the current position and advance by one frame
    /// period. `None` once playback has stopped.
    async fn next_frame(&mut self) -> RecordingResult<Option<CapturedFrame>>;

    async fn close(&mut self);
}

/// Opens artifacts for playback
#[async_trait]
pub trait MediaLoader: Send + Sync {
    async fn load(&self, artifact: &RecordingArtifact) -> RecordingResult<Box<dyn MediaPlayer>>;
}

pub struct FfmpegMediaLoader {
    fps: u32,
}

impl FfmpegMediaLoader {
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }
}

#[async_trait]
impl MediaLoader for FfmpegMediaLoader {
    async fn load(&self, artifact: &RecordingArtifact) -> RecordingResult<Box<dyn MediaPlayer>> {
        let player = FfmpegPlayer::open(artifact, self.fps).await?;
        Ok(Box::new(player))
    }
}

struct Decoder {
    child: Child,
    stdout: ChildStdout,
}

pub struct FfmpegPlayer {
    file: NamedTempFile,
    size: Resolution,
    duration: f64,
    fps: u32,
    position: f64,
    decoder: Option<Decoder>,
}

impl FfmpegPlayer {
    pub async fn open(artifact: &RecordingArtifact, fps: u32) -> RecordingResult<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("recording-")
            .suffix(".webm")
            .tempfile()?;
        file.as_file_mut().write_all(artifact.bytes())?;
        file.as_file_mut().flush()?;

        let path = file.path().to_string_lossy().to_string();
        let probe = run_ffprobe(&[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:format=duration",
            "-of",
            "json",
            &path,
        ])
        .await?;

        let size = probe.video_size().ok_or_else(|| {
            RecordingError::ExportFailure("Recording has no video stream".to_string())
        })?;
        let duration = probe.declared_duration();

        tracing::info!(
            "Loaded recording: {} ({} bytes, declared duration {})",
            size,
            artifact.len(),
            duration
        );

        Ok(Self {
            file,
            size,
            duration,
            fps: fps.max(1),
            position: 0.0,
            decoder: None,
        })
    }

    fn path(&self) -> String {
        self.file.path().to_string_lossy().to_string()
    }

    async fn stop_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            let _ = decoder.child.kill().await;
        }
    }

    fn spawn_decoder(&self) -> RecordingResult<Decoder> {
        let start = format!("{:.3}", self.position);
        let path = self.path();
        let filter = format!("fps={}", self.fps);

        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-ss",
                start.as_str(),
                "-i",
                path.as_str(),
                "-an",
                "-vf",
                filter.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecordingError::ExportFailure(format!("Failed to start decoder: {}", e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            RecordingError::ExportFailure("Decoder has no output pipe".to_string())
        })?;

        Ok(Decoder { child, stdout })
    }
}

#[async_trait]
impl MediaPlayer for FfmpegPlayer {
    fn declared_duration(&self) -> f64 {
        self.duration
    }

    fn native_size(&self) -> Resolution {
        self.size
    }

    fn position(&self) -> f64 {
        self.position
    }

    async fn seek(&mut self, seconds: f64) -> RecordingResult<f64> {
        self.stop_decoder().await;

        let path = self.path();
        let interval = format!("{:.3}%+#1", seconds.max(0.0));
        let probe = run_ffprobe(&[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-read_intervals",
            &interval,
            "-show_entries",
            "frame=best_effort_timestamp_time,pts_time",
            "-of",
            "json",
            &path,
        ])
        .await?;

        // No decodable frame at the target leaves the position where it was
        if let Some(reached) = probe.first_frame_time() {
            self.position = reached.max(0.0);
        }
        Ok(self.position)
    }

    async fn next_frame(&mut self) -> RecordingResult<Option<CapturedFrame>> {
        if self.decoder.is_none() {
            self.decoder = Some(self.spawn_decoder()?);
        }

        let mut buffer = vec![0u8; self.size.byte_len()];
        let read = match self.decoder.as_mut() {
            Some(decoder) => decoder.stdout.read_exact(&mut buffer).await,
            None => return Ok(None),
        };

        match read {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.stop_decoder().await;
                return Ok(None);
            }
            Err(e) => return Err(RecordingError::ExportFailure(format!("Decoder read failed: {}", e))),
        }

        let image = RgbaImage::from_raw(self.size.width, self.size.height, buffer).ok_or_else(|| {
            RecordingError::ExportFailure("Decoded frame has unexpected size".to_string())
        })?;
        let frame = CapturedFrame::new(image, self.position * 1000.0);
        self.position += 1.0 / self.fps as f64;
        Ok(Some(frame))
    }

    async fn close(&mut self) {
        self.stop_decoder().await;
    }
}

async fn run_ffprobe(args: &[&str]) -> RecordingResult<ProbeOutput> {
    // A prober timeout drops this future mid-run; the child dies with it
    let output = tool_output("ffprobe", args)
        .await
        .map_err(|e| RecordingError::ExportFailure(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RecordingError::ExportFailure(format!(
            "ffprobe failed: {}",
            last_lines(&stderr, 3)
        )));
    }

    ProbeOutput::parse(&String::from_utf8_lossy(&output.stdout))
}
