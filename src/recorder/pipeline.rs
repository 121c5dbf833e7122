//! Compositor/encoder pipeline
//!
//! Setup acquires the camera (optional) before the screen (required), sizes
//! the surface, precomputes the overlay layout and starts the encoder. The
//! running pipeline is a cooperative loop driven by three events: the stop
//! signal, the chunk slice timer and the frame timer.

use crate::capture::geometry::{surface_size, Resolution};
use crate::config::RecorderConfig;
use crate::processing::compositor::{AreaCrop, Compositor, OverlayLayout};
use crate::recorder::artifact::RecordingArtifact;
use crate::recorder::channel::{AudioTrack, RecordingResult, SourceProvider, VideoSource};
use crate::recorder::encoder::{
    negotiate_codec, ChunkBuffer, Encoder, EncoderFactory, EncoderSettings, StreamDescriptor,
};
use crate::recorder::session::{CaptureSession, TerminationReason};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

pub struct CompositorPipeline {
    config: RecorderConfig,
    provider: Arc<dyn SourceProvider>,
    encoders: Arc<dyn EncoderFactory>,
}

impl CompositorPipeline {
    pub fn new(config: RecorderConfig, provider: Arc<dyn SourceProvider>, encoders: Arc<dyn EncoderFactory>) -> Self {
        Self {
            config,
            provider,
            encoders,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Acquire sources and start the encoder.
    ///
    /// Any failure releases everything acquired so far before returning.
    pub async fn prepare(&self, session: &CaptureSession) -> RecordingResult<PreparedRecording> {
        // Camera first: some consent flows serialize prompts
        let mut camera = None;
        if session.with_webcam {
            match self.provider.acquire_camera().await {
                Ok(source) => camera = Some(source),
                Err(e) => tracing::warn!("Webcam unavailable, recording without overlay: {}", e),
            }
        }

        let mut screen = match self.provider.acquire_screen(session.mode, session.with_audio).await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Failed to acquire screen: {}", e);
                if let Some(camera) = camera.as_mut() {
                    release(camera.as_mut()).await;
                }
                return Err(e);
            }
        };

        let screen_size = screen.native_size();
        let area = session.area.map(|selection| AreaCrop {
            selection,
            viewport: session.viewport.unwrap_or(screen_size),
        });
        let surface = surface_size(area.as_ref().map(|a| &a.selection), screen_size);
        let overlay = camera.as_ref().map(|camera| {
            OverlayLayout::new(
                camera.native_size(),
                surface,
                session.webcam_anchor,
                &self.config.overlay,
            )
        });
        let compositor = Compositor::new(screen_size, area, overlay);

        let audio = if session.with_audio {
            let track = screen.take_audio_track();
            if track.is_none() {
                tracing::warn!("Audio requested but the screen source has no audio track");
            }
            track
        } else {
            None
        };
        let has_audio = audio.is_some();

        let encoder = match self.start_encoder(compositor.size(), audio).await {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::error!("Failed to start encoder: {}", e);
                release(screen.as_mut()).await;
                if let Some(camera) = camera.as_mut() {
                    release(camera.as_mut()).await;
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Session {} ready: surface {}, overlay {}, audio {}, codec {}",
            session.id,
            compositor.size(),
            compositor.overlay().is_some(),
            has_audio,
            encoder.codec()
        );

        Ok(PreparedRecording {
            media_type: encoder.codec().media_type(has_audio),
            screen,
            camera,
            compositor,
            encoder,
            settings: self.config.encoder.clone(),
            has_audio,
        })
    }

    async fn start_encoder(
        &self,
        resolution: Resolution,
        audio: Option<AudioTrack>,
    ) -> RecordingResult<Box<dyn Encoder>> {
        let settings = &self.config.encoder;
        let codec = negotiate_codec(self.encoders.as_ref(), &settings.codecs)?;
        let mut encoder = self.encoders.create(codec, settings)?;

        let stream = StreamDescriptor {
            resolution,
            fps: settings.fps,
            audio,
        };
        if let Err(e) = encoder.start(&stream).await {
            encoder.abort().await;
            return Err(e);
        }
        Ok(encoder)
    }
}

/// The result of a completed recording run
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    pub artifact: RecordingArtifact,
    pub reason: TerminationReason,
    pub frames: u64,
    pub chunks: usize,
}

/// Sources, surface and encoder of one session, ready to run
pub struct PreparedRecording {
    screen: Box<dyn VideoSource>,
    camera: Option<Box<dyn VideoSource>>,
    compositor: Compositor,
    encoder: Box<dyn Encoder>,
    settings: EncoderSettings,
    media_type: String,
    has_audio: bool,
}

impl PreparedRecording {
    pub fn surface_size(&self) -> Resolution {
        self.compositor.size()
    }

    pub fn has_overlay(&self) -> bool {
        self.compositor.overlay().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Run until `stop` fires (or its sender is dropped) or the screen
    /// stream ends, then finalize. Sources are always released.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> RecordingResult<FinishedRecording> {
        let mut chunks = ChunkBuffer::new();
        let mut frames = 0u64;

        let outcome = self.tick_loop(&mut stop, &mut chunks, &mut frames).await;

        let finished = match outcome {
            Ok(reason) => self.encoder.finish().await.map(|tail| (reason, tail)),
            Err(e) => {
                tracing::error!("Recording failed: {}", e);
                self.encoder.abort().await;
                Err(e)
            }
        };

        self.teardown().await;

        let (reason, tail) = finished?;
        for chunk in tail {
            chunks.push(chunk);
        }

        let chunk_count = chunks.len();
        tracing::info!(
            "Recording finalized: {} frames, {} chunks, {} bytes",
            frames,
            chunk_count,
            chunks.total_bytes()
        );

        Ok(FinishedRecording {
            artifact: chunks.into_artifact(self.media_type),
            reason,
            frames,
            chunks: chunk_count,
        })
    }

    async fn tick_loop(
        &mut self,
        stop: &mut oneshot::Receiver<()>,
        chunks: &mut ChunkBuffer,
        frames: &mut u64,
    ) -> RecordingResult<TerminationReason> {
        let mut frame_tick = interval(self.settings.frame_interval());
        frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let timeslice = self.settings.timeslice();
        let mut slice_tick = interval_at(Instant::now() + timeslice, timeslice);
        let started = Instant::now();

        loop {
            tokio::select! {
                biased;

                _ = &mut *stop => {
                    tracing::info!("Stop requested");
                    break Ok(TerminationReason::Stopped);
                }
                _ = slice_tick.tick() => {
                    if let Some(chunk) = self.encoder.request_data().await? {
                        chunks.push(chunk);
                    }
                }
                _ = frame_tick.tick() => {
                    if self.screen.is_ended() {
                        tracing::info!("Screen stream ended, finalizing");
                        break Ok(TerminationReason::SourceEnded);
                    }

                    let screen = self.screen.latest_frame();
                    let camera = self.camera.as_mut().and_then(|c| c.latest_frame());
                    self.compositor.draw(
                        screen.as_ref().map(|f| f.image.as_ref()),
                        camera.as_ref().map(|f| f.image.as_ref()),
                    );
                    // Skipped ticks show up as a gap in the timestamps
                    self.encoder
                        .write_frame(self.compositor.surface(), started.elapsed())
                        .await?;
                    *frames += 1;
                }
            }
        }
    }

    /// Release every source. Safe to call when some were never acquired or
    /// were already released.
    async fn teardown(&mut self) {
        release(self.screen.as_mut()).await;
        if let Some(camera) = self.camera.as_mut() {
            release(camera.as_mut()).await;
        }
    }
}

async fn release(source: &mut dyn VideoSource) {
    if let Err(e) = source.stop().await {
        tracing::warn!("Failed to release {} source: {}", source.kind(), e);
    }
}
