//! Recording commands

use crate::capture::area::{select_area, PointerInput};
use crate::capture::geometry::{Rectangle, Resolution};
use crate::recorder::artifact::RecordingArtifact;
use crate::recorder::channel::RecordingError;
use crate::recorder::coordinator::{RecordingCoordinator, SessionEvent, SessionStatus};
use crate::recorder::session::SessionOptions;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Application state for recording
pub struct RecorderState {
    pub coordinator: Arc<Mutex<RecordingCoordinator>>,
}

impl RecorderState {
    pub fn new(coordinator: RecordingCoordinator) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(coordinator)),
        }
    }
}

/// Start a capture session; returns its id
pub async fn start_session(state: &RecorderState, options: SessionOptions) -> Result<String, String> {
    let mut coordinator = state.coordinator.lock().await;
    coordinator
        .start_session(options)
        .await
        .map(|id| id.to_string())
        .map_err(|e| e.to_string())
}

/// Stop the active session and hand back the finished recording
pub async fn stop_session(state: &RecorderState) -> Result<RecordingArtifact, String> {
    let mut coordinator = state.coordinator.lock().await;
    coordinator.stop_session().await.map_err(|e| e.to_string())
}

pub async fn session_status(state: &RecorderState) -> Result<SessionStatus, String> {
    let coordinator = state.coordinator.lock().await;
    Ok(coordinator.status())
}

/// Subscribe to `SessionStarted` / `SessionStopped` notifications
pub async fn session_events(state: &RecorderState) -> broadcast::Receiver<SessionEvent> {
    state.coordinator.lock().await.subscribe()
}

/// Select an area from pointer input in viewport pixels
pub async fn request_area_selection(
    state: &RecorderState,
    inputs: mpsc::Receiver<PointerInput>,
    viewport: Resolution,
) -> Result<Rectangle, String> {
    // Only the limits are needed; the drag must not hold the coordinator
    let selection = state.coordinator.lock().await.selection_config().clone();
    select_area(inputs, viewport, &selection)
        .await
        .map_err(|e| RecordingError::from(e).to_string())
}
