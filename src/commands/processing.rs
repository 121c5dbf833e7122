//! Editing commands
//!
//! Duration probing, trimming and export of finished recordings.

use crate::processing::trim::{TrimRange, Trimmer};
use crate::recorder::artifact::{export_file_name, RecordingArtifact};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Label for untrimmed exports
pub const RECORDING_LABEL: &str = "screen-recording";
/// Label for trimmed exports
pub const TRIMMED_LABEL: &str = "screen-recording-trimmed";

/// Application state for the editor
pub struct EditorState {
    pub trimmer: Arc<Trimmer>,
}

impl EditorState {
    pub fn new(trimmer: Trimmer) -> Self {
        Self {
            trimmer: Arc::new(trimmer),
        }
    }
}

/// Resolve the playable duration of a recording in seconds
pub async fn probe_duration(state: &EditorState, artifact: &RecordingArtifact) -> Result<f64, String> {
    state
        .trimmer
        .probe_duration(artifact)
        .await
        .map_err(|e| e.to_string())
}

/// Trim a recording to `[start, end)`.
///
/// `on_progress` receives values in [0, 1]. A range covering the whole
/// recording returns the original artifact.
pub async fn trim_recording<F>(
    state: &EditorState,
    artifact: &RecordingArtifact,
    start: f64,
    end: f64,
    duration: f64,
    on_progress: F,
) -> Result<RecordingArtifact, String>
where
    F: FnMut(f64) + Send,
{
    let range = TrimRange::new(start, end, duration).map_err(|e| e.to_string())?;

    tracing::info!("Trim requested: {:.2}s..{:.2}s of {:.2}s", start, end, duration);

    state
        .trimmer
        .trim(artifact, range, duration, on_progress)
        .await
        .map_err(|e| e.to_string())
}

/// Write a recording into `dir` under a timestamped name
pub async fn export_recording(artifact: &RecordingArtifact, dir: &Path, label: &str) -> Result<PathBuf, String> {
    let path = dir.join(export_file_name(label, Utc::now(), "webm"));
    tokio::fs::write(&path, artifact.bytes())
        .await
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    tracing::info!("Exported {} bytes to {}", artifact.len(), path.display());

    Ok(path)
}
