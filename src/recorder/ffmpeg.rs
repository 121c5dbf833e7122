//! FFmpeg streaming WebM encoder
//!
//! Raw RGBA frames are written to FFmpeg's stdin; the WebM container comes
//! back on stdout and is drained into chunks on every `request_data` call.

use crate::capture::geometry::Resolution;
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::recorder::encoder::{
    EncodedChunk, Encoder, EncoderFactory, EncoderSettings, FrameClock, StreamDescriptor, VideoCodec,
};
use crate::utils::ffmpeg::{check_ffmpeg, last_lines, list_encoders};
use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

/// FFmpeg encoder implementing a codec
pub fn encoder_name(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::Vp9 => "libvpx-vp9",
        VideoCodec::Vp8 => "libvpx",
    }
}

/// Build the FFmpeg command line for a live WebM encode
pub fn build_encoder_args(codec: VideoCodec, settings: &EncoderSettings, stream: &StreamDescriptor) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        // Input 0: composited frames from stdin
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        "rgba".into(),
        "-video_size".into(),
        stream.resolution.to_string(),
        "-framerate".into(),
        stream.fps.to_string(),
        "-i".into(),
        "-".into(),
    ];

    if let Some(audio) = &stream.audio {
        args.extend([
            "-thread_queue_size".into(),
            "1024".into(),
            "-f".into(),
            audio.input_format.clone(),
            "-i".into(),
            audio.input.clone(),
        ]);
    }

    args.extend(["-map".into(), "0:v".into()]);
    if stream.audio.is_some() {
        args.extend(["-map".into(), "1:a".into()]);
    }

    args.extend([
        // yuv420p needs even dimensions
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:v".into(),
        encoder_name(codec).into(),
        "-b:v".into(),
        settings.video_bits_per_second.to_string(),
        "-deadline".into(),
        "realtime".into(),
        "-cpu-used".into(),
        "8".into(),
    ]);

    if stream.audio.is_some() {
        args.extend([
            "-c:a".into(),
            "libopus".into(),
            "-b:a".into(),
            settings.audio_bits_per_second.to_string(),
        ]);
    }

    args.extend([
        "-f".into(),
        "webm".into(),
        "-cluster_time_limit".into(),
        settings.timeslice_ms.to_string(),
        "pipe:1".into(),
    ]);

    args
}

struct RunningEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    started_at: Instant,
    resolution: Resolution,
    clock: FrameClock,
}

pub struct FfmpegEncoder {
    codec: VideoCodec,
    settings: EncoderSettings,
    output: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<String>>,
    running: Option<RunningEncoder>,
    frame_count: u64,
}

impl FfmpegEncoder {
    pub fn new(codec: VideoCodec, settings: EncoderSettings) -> Self {
        Self {
            codec,
            settings,
            output: Arc::new(Mutex::new(Vec::new())),
            stderr: Arc::new(Mutex::new(String::new())),
            running: None,
            frame_count: 0,
        }
    }

    fn drain(&self, started_at: Instant) -> Option<EncodedChunk> {
        let data = std::mem::take(&mut *self.output.lock());
        if data.is_empty() {
            return None;
        }
        Some(EncodedChunk::new(started_at.elapsed().as_millis() as u64, data))
    }

    fn stderr_tail(&self) -> String {
        last_lines(&self.stderr.lock(), 5)
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn codec(&self) -> VideoCodec {
        self.codec
    }

    async fn start(&mut self, stream: &StreamDescriptor) -> RecordingResult<()> {
        if self.running.is_some() {
            return Err(RecordingError::EncodingError("Encoder already started".to_string()));
        }

        let args = build_encoder_args(self.codec, &self.settings, stream);
        tracing::debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecordingError::EncodingError(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecordingError::EncodingError("FFmpeg stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RecordingError::EncodingError("FFmpeg stderr unavailable".to_string()))?;

        let output = self.output.clone();
        let stdout_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => output.lock().extend_from_slice(&buf[..n]),
                    Err(e) => {
                        tracing::warn!("Encoder output read failed: {}", e);
                        break;
                    }
                }
            }
        });

        let log = self.stderr.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut log = log.lock();
                log.push_str(&line);
                log.push('\n');
            }
        });

        tracing::info!(
            "Started FFmpeg encoder: {} {} @ {}fps{}",
            encoder_name(self.codec),
            stream.resolution,
            stream.fps,
            if stream.audio.is_some() { " with audio" } else { "" }
        );

        self.running = Some(RunningEncoder {
            child,
            stdin,
            stdout_task,
            stderr_task,
            started_at: Instant::now(),
            resolution: stream.resolution,
            clock: FrameClock::new(stream.fps),
        });
        self.frame_count = 0;
        Ok(())
    }

    async fn write_frame(&mut self, frame: &RgbaImage, timestamp: Duration) -> RecordingResult<()> {
        let running = self
            .running
            .as_mut()
            .ok_or_else(|| RecordingError::EncodingError("Encoder not started".to_string()))?;

        if frame.dimensions() != (running.resolution.width, running.resolution.height) {
            return Err(RecordingError::EncodingError(format!(
                "Frame is {}x{}, encoder expects {}",
                frame.width(),
                frame.height(),
                running.resolution
            )));
        }

        // rawvideo input is stamped by position, so late frames are repeated
        let copies = running.clock.copies_for(timestamp);
        if copies > 1 {
            tracing::debug!("Frame at {}ms fills {} slots", timestamp.as_millis(), copies);
        }

        let stdin = running
            .stdin
            .as_mut()
            .ok_or_else(|| RecordingError::EncodingError("Encoder input closed".to_string()))?;

        for _ in 0..copies {
            let written = stdin.write_all(frame.as_raw()).await;
            if let Err(e) = written {
                return Err(RecordingError::EncodingError(format!(
                    "Failed to write frame: {} {}",
                    e,
                    self.stderr_tail()
                )));
            }
        }

        self.frame_count += copies;
        Ok(())
    }

    async fn request_data(&mut self) -> RecordingResult<Option<EncodedChunk>> {
        let started_at = match &self.running {
            Some(running) => running.started_at,
            None => return Ok(None),
        };
        Ok(self.drain(started_at))
    }

    async fn finish(&mut self) -> RecordingResult<Vec<EncodedChunk>> {
        let Some(mut running) = self.running.take() else {
            return Ok(Vec::new());
        };

        // Closing stdin signals EOF so FFmpeg finalizes the container
        drop(running.stdin.take());

        let status = running
            .child
            .wait()
            .await
            .map_err(|e| RecordingError::EncodingError(format!("Failed to wait for FFmpeg: {}", e)))?;
        let _ = running.stdout_task.await;
        let _ = running.stderr_task.await;

        if !status.success() {
            return Err(RecordingError::EncodingError(format!(
                "FFmpeg exited with {}: {}",
                status,
                self.stderr_tail()
            )));
        }

        tracing::info!("FFmpeg encoder finished: {} frames", self.frame_count);
        Ok(self.drain(running.started_at).into_iter().collect())
    }

    async fn abort(&mut self) {
        if let Some(mut running) = self.running.take() {
            drop(running.stdin.take());
            let _ = running.child.kill().await;
            running.stdout_task.abort();
            running.stderr_task.abort();
            tracing::info!("FFmpeg encoder aborted after {} frames", self.frame_count);
        }
        self.output.lock().clear();
    }
}

/// Creates FFmpeg encoders for the codecs the local build ships
pub struct FfmpegEncoderFactory {
    available: Vec<String>,
}

impl FfmpegEncoderFactory {
    /// Query the local FFmpeg for its encoders
    pub fn detect() -> RecordingResult<Self> {
        check_ffmpeg()?;
        let available = list_encoders()?;
        tracing::debug!("FFmpeg reports {} encoders", available.len());
        Ok(Self { available })
    }

    pub fn with_encoders(available: Vec<String>) -> Self {
        Self { available }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn supports(&self, codec: VideoCodec) -> bool {
        let name = encoder_name(codec);
        self.available.iter().any(|e| e == name)
    }

    fn create(&self, codec: VideoCodec, settings: &EncoderSettings) -> RecordingResult<Box<dyn Encoder>> {
        if !self.supports(codec) {
            return Err(RecordingError::EncodingError(format!(
                "FFmpeg has no {} encoder",
                encoder_name(codec)
            )));
        }
        Ok(Box::new(FfmpegEncoder::new(codec, settings.clone())))
    }
}
