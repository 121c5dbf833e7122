//! FFmpeg-backed live sources
//!
//! Each source runs one FFmpeg process reading a capture device and writing
//! raw RGBA frames to stdout. A reader task keeps only the most recent frame
//! so the compositor never draws a stale sample.

use crate::capture::geometry::Resolution;
use crate::config::CaptureBackendConfig;
use crate::recorder::channel::{
    AudioTrack, CapturedFrame, RecordingError, RecordingResult, SourceKind, SourceProvider, VideoSource,
};
use crate::recorder::session::CaptureMode;
use crate::utils::ffmpeg::{classify_open_failure, default_monitor_source, parse_stream_size};
use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Build the FFmpeg command line reading `input` and emitting raw RGBA
pub fn build_capture_args(format: &str, input: &str, fps: u32) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-nostats".into(),
        "-f".into(),
        format.into(),
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        input.into(),
        "-map".into(),
        "0:v".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "pipe:1".into(),
    ]
}

pub struct FfmpegCaptureSource {
    id: String,
    kind: SourceKind,
    size: Resolution,
    latest: Arc<Mutex<Option<CapturedFrame>>>,
    ended: Arc<AtomicBool>,
    audio: Option<AudioTrack>,
    child: Option<Child>,
    tasks: Vec<JoinHandle<()>>,
}

impl FfmpegCaptureSource {
    /// Start FFmpeg on a device and wait until it reports the stream size
    pub async fn open(
        id: &str,
        kind: SourceKind,
        format: &str,
        input: &str,
        fps: u32,
        timeout: Duration,
    ) -> RecordingResult<Self> {
        let args = build_capture_args(format, input, fps);
        tracing::debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecordingError::CaptureError(format!("Failed to start FFmpeg for {}: {}", id, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecordingError::CaptureError(format!("{} has no output pipe", id)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RecordingError::CaptureError(format!("{} has no error pipe", id)))?;

        let mut lines = BufReader::new(stderr).lines();
        let mut log = String::new();

        // The output stream line is only printed once the device delivered
        // its first frame, so this also waits out consent prompts
        let negotiate = async {
            let mut in_output = false;
            while let Some(line) = lines.next_line().await? {
                log.push_str(&line);
                log.push('\n');
                if line.starts_with("Output #0") {
                    in_output = true;
                } else if in_output {
                    if let Some(size) = parse_stream_size(&line) {
                        return Ok(Some(size));
                    }
                }
            }
            Ok::<_, std::io::Error>(None)
        };

        let negotiated = tokio::time::timeout(timeout, negotiate).await;
        let size = match negotiated {
            Ok(Ok(Some(size))) => size,
            Ok(Ok(None)) => {
                let _ = child.wait().await;
                return Err(classify_open_failure(&log));
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(RecordingError::IoError(e));
            }
            Err(_) => {
                tracing::warn!("{} did not deliver a stream within {:?}", id, timeout);
                let _ = child.kill().await;
                return Err(RecordingError::NoStreamAvailable);
            }
        };

        tracing::info!("Acquired {} source {} ({} {})", kind, size, format, input);

        let latest = Arc::new(Mutex::new(None));
        let ended = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_frames(
            id.to_string(),
            stdout,
            size,
            latest.clone(),
            ended.clone(),
        ));

        let log_id = id.to_string();
        let drain = tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!("[{}] {}", log_id, line);
            }
        });

        Ok(Self {
            id: id.to_string(),
            kind,
            size,
            latest,
            ended,
            audio: None,
            child: Some(child),
            tasks: vec![reader, drain],
        })
    }

    pub fn with_audio(mut self, audio: Option<AudioTrack>) -> Self {
        self.audio = audio;
        self
    }
}

async fn read_frames(
    id: String,
    mut stdout: ChildStdout,
    size: Resolution,
    latest: Arc<Mutex<Option<CapturedFrame>>>,
    ended: Arc<AtomicBool>,
) {
    let started = Instant::now();
    let mut count = 0u64;

    loop {
        let mut buffer = vec![0u8; size.byte_len()];
        if stdout.read_exact(&mut buffer).await.is_err() {
            break;
        }
        if let Some(image) = RgbaImage::from_raw(size.width, size.height, buffer) {
            let timestamp_ms = started.elapsed().as_secs_f64() * 1000.0;
            *latest.lock() = Some(CapturedFrame::new(image, timestamp_ms));
            count += 1;
        }
    }

    ended.store(true, Ordering::SeqCst);
    tracing::info!("{} stream ended after {} frames", id, count);
}

#[async_trait]
impl VideoSource for FfmpegCaptureSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn native_size(&self) -> Resolution {
        self.size
    }

    fn latest_frame(&mut self) -> Option<CapturedFrame> {
        self.latest.lock().clone()
    }

    fn take_audio_track(&mut self) -> Option<AudioTrack> {
        self.audio.take()
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let _ = child.kill().await;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::info!("Released {} source", self.id);
        Ok(())
    }
}

/// Acquires screen and camera sources through FFmpeg input devices
pub struct FfmpegSourceProvider {
    config: CaptureBackendConfig,
    fps: u32,
}

impl FfmpegSourceProvider {
    pub fn new(config: CaptureBackendConfig, fps: u32) -> Self {
        Self { config, fps }
    }

    /// System audio input: the configured device, else the default sink's
    /// monitor on PulseAudio/PipeWire
    async fn system_audio(&self) -> Option<AudioTrack> {
        if let (Some(format), Some(input)) = (&self.config.audio_format, &self.config.audio_input) {
            return Some(AudioTrack {
                label: input.clone(),
                input_format: format.clone(),
                input: input.clone(),
            });
        }

        if !cfg!(target_os = "linux") {
            return None;
        }

        let monitor = tokio::task::spawn_blocking(default_monitor_source)
            .await
            .ok()
            .flatten()?;
        Some(AudioTrack {
            label: monitor.clone(),
            input_format: "pulse".to_string(),
            input: monitor,
        })
    }
}

#[async_trait]
impl SourceProvider for FfmpegSourceProvider {
    async fn acquire_camera(&self) -> RecordingResult<Box<dyn VideoSource>> {
        let source = FfmpegCaptureSource::open(
            "webcam",
            SourceKind::Webcam,
            &self.config.camera_format,
            &self.config.camera_input,
            self.fps,
            self.config.acquire_timeout(),
        )
        .await?;
        Ok(Box::new(source))
    }

    async fn acquire_screen(&self, mode: CaptureMode, with_audio: bool) -> RecordingResult<Box<dyn VideoSource>> {
        if mode == CaptureMode::Window {
            tracing::info!("Window capture records through the screen input");
        }

        let source = FfmpegCaptureSource::open(
            "screen",
            SourceKind::Screen,
            &self.config.screen_format,
            &self.config.screen_input,
            self.fps,
            self.config.acquire_timeout(),
        )
        .await?;

        let audio = if with_audio { self.system_audio().await } else { None };
        Ok(Box::new(source.with_audio(audio)))
    }
}
