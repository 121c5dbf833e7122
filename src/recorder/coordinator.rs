//! Recording coordinator
//!
//! Owns at most one capture session at a time. The running pipeline lives in
//! its own task; stop is delivered through a oneshot channel and lifecycle
//! transitions are broadcast to any number of subscribers.

use crate::capture::area::{select_area, PointerInput};
use crate::capture::geometry::{Rectangle, Resolution};
use crate::config::SelectionConfig;
use crate::recorder::artifact::RecordingArtifact;
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::recorder::pipeline::{CompositorPipeline, FinishedRecording};
use crate::recorder::session::{CaptureMode, CaptureSession, SessionOptions, SessionPhase, TerminationReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lifecycle notifications emitted to the orchestration layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        session_id: Uuid,
        mode: CaptureMode,
        started_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    SessionStopped {
        session_id: Uuid,
        reason: TerminationReason,
    },
}

/// Status snapshot for the orchestration layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_recording: bool,
    pub session_id: Option<Uuid>,
    pub phase: SessionPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

struct ActiveSession {
    session: CaptureSession,
    started_at: DateTime<Utc>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<RecordingResult<FinishedRecording>>,
}

pub struct RecordingCoordinator {
    pipeline: Arc<CompositorPipeline>,
    selection: SelectionConfig,
    active: Option<ActiveSession>,
    last_phase: SessionPhase,
    events: broadcast::Sender<SessionEvent>,
}

impl RecordingCoordinator {
    pub fn new(pipeline: CompositorPipeline) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            selection: pipeline.config().selection.clone(),
            pipeline: Arc::new(pipeline),
            active: None,
            last_phase: SessionPhase::Created,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Whether a session is active. A session whose screen stream ended on
    /// its own still counts until it is stopped and collected.
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Minimum selection size, for running a selection without holding the coordinator
    pub fn selection_config(&self) -> &SelectionConfig {
        &self.selection
    }

    /// Run an area selection over pointer input in viewport pixels
    pub async fn request_area_selection(
        &self,
        inputs: mpsc::Receiver<PointerInput>,
        viewport: Resolution,
    ) -> RecordingResult<Rectangle> {
        Ok(select_area(inputs, viewport, &self.selection).await?)
    }

    /// Validate options, acquire sources and start recording
    pub async fn start_session(&mut self, options: SessionOptions) -> RecordingResult<Uuid> {
        if self.active.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let session = CaptureSession::from_options(options, &self.selection)?;
        tracing::info!(
            "Starting session {} (mode {:?}, webcam {}, audio {})",
            session.id,
            session.mode,
            session.with_webcam,
            session.with_audio
        );

        let prepared = match self.pipeline.prepare(&session).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.last_phase = SessionPhase::Terminated {
                    reason: TerminationReason::Failed(e.to_string()),
                };
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let events = self.events.clone();
        let session_id = session.id;
        let handle = tokio::spawn(async move {
            let result = prepared.run(stop_rx).await;
            let reason = match &result {
                Ok(finished) => finished.reason.clone(),
                Err(e) => TerminationReason::Failed(e.to_string()),
            };
            let _ = events.send(SessionEvent::SessionStopped { session_id, reason });
            result
        });

        let started_at = Utc::now();
        self.last_phase = SessionPhase::Active { started_at };
        let _ = self.events.send(SessionEvent::SessionStarted {
            session_id,
            mode: session.mode,
            started_at,
        });

        self.active = Some(ActiveSession {
            session,
            started_at,
            stop_tx: Some(stop_tx),
            handle,
        });

        Ok(session_id)
    }

    /// Stop the active session and return its artifact
    pub async fn stop_session(&mut self) -> RecordingResult<RecordingArtifact> {
        let mut active = self.active.take().ok_or(RecordingError::NotRecording)?;

        if let Some(stop_tx) = active.stop_tx.take() {
            // The pipeline may already have finished on its own
            let _ = stop_tx.send(());
        }

        let result = match active.handle.await {
            Ok(result) => result,
            Err(e) => Err(RecordingError::CaptureError(format!("Recording task failed: {}", e))),
        };

        match result {
            Ok(finished) => {
                tracing::info!(
                    "Session {} stopped after {}ms: {} bytes",
                    active.session.id,
                    (Utc::now() - active.started_at).num_milliseconds(),
                    finished.artifact.len()
                );
                self.last_phase = SessionPhase::Terminated {
                    reason: finished.reason,
                };
                Ok(finished.artifact)
            }
            Err(e) => {
                tracing::error!("Session {} failed: {}", active.session.id, e);
                self.last_phase = SessionPhase::Terminated {
                    reason: TerminationReason::Failed(e.to_string()),
                };
                Err(e)
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &self.active {
            Some(active) => SessionStatus {
                is_recording: true,
                session_id: Some(active.session.id),
                phase: SessionPhase::Active {
                    started_at: active.started_at,
                },
                started_at: Some(active.started_at),
                duration_ms: (Utc::now() - active.started_at).num_milliseconds().max(0) as u64,
            },
            None => SessionStatus {
                is_recording: false,
                session_id: None,
                phase: self.last_phase.clone(),
                started_at: None,
                duration_ms: 0,
            },
        }
    }
}
