//! Capture session model
//!
//! A `CaptureSession` is created from the options the orchestration layer
//! sends, owned by the coordinator for its lifetime and dropped on stop,
//! cancel or error.

use crate::capture::area::check_minimum_size;
use crate::capture::geometry::{Rectangle, Resolution, WebcamAnchor};
use crate::config::SelectionConfig;
use crate::recorder::channel::{RecordingError, RecordingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What part of the display gets recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    #[default]
    FullScreen,
    Window,
    Area,
}

/// Options received with `StartSession`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    pub mode: CaptureMode,
    pub with_webcam: bool,
    pub with_audio: bool,
    pub webcam_anchor: WebcamAnchor,
    /// Selected rectangle in viewport pixels (area mode)
    pub area: Option<Rectangle>,
    /// Size of the viewport the area was selected in
    pub viewport: Option<Resolution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    pub id: Uuid,
    pub mode: CaptureMode,
    pub area: Option<Rectangle>,
    pub viewport: Option<Resolution>,
    pub with_webcam: bool,
    pub with_audio: bool,
    pub webcam_anchor: WebcamAnchor,
}

impl CaptureSession {
    /// Validate options and create a session. An area below the selection
    /// minimum is rejected, however it was obtained.
    pub fn from_options(options: SessionOptions, selection: &SelectionConfig) -> RecordingResult<Self> {
        let area = match options.mode {
            CaptureMode::Area => {
                let area = options.area.ok_or_else(|| {
                    RecordingError::ConfigurationError(
                        "Area mode requires a selected rectangle".to_string(),
                    )
                })?;
                check_minimum_size(&area, selection)?;
                Some(area)
            }
            // A stale rectangle from a previous selection must not crop a full recording
            CaptureMode::FullScreen | CaptureMode::Window => None,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            mode: options.mode,
            area,
            viewport: options.viewport,
            with_webcam: options.with_webcam,
            with_audio: options.with_audio,
            webcam_anchor: options.webcam_anchor,
        })
    }
}

/// Session lifecycle: `created -> active -> terminated`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum SessionPhase {
    Created,
    Active { started_at: DateTime<Utc> },
    Terminated { reason: TerminationReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    Stopped,
    SourceEnded,
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::area::SelectionError;

    #[test]
    fn test_options_from_orchestrator_json() {
        let options: SessionOptions = serde_json::from_str(
            r#"{
                "mode": "area",
                "withWebcam": true,
                "withAudio": false,
                "webcamAnchor": "top-right",
                "area": { "x": 10, "y": 20, "width": 300, "height": 200 },
                "viewport": { "width": 1280, "height": 720 }
            }"#,
        )
        .unwrap();

        let session = CaptureSession::from_options(options, &SelectionConfig::default()).unwrap();
        assert_eq!(session.mode, CaptureMode::Area);
        assert_eq!(session.webcam_anchor, WebcamAnchor::TopRight);
        assert_eq!(session.area, Some(Rectangle::new(10.0, 20.0, 300.0, 200.0)));
        assert!(session.with_webcam);
    }

    #[test]
    fn test_area_mode_requires_rectangle() {
        let options = SessionOptions {
            mode: CaptureMode::Area,
            ..Default::default()
        };
        assert!(matches!(
            CaptureSession::from_options(options, &SelectionConfig::default()),
            Err(RecordingError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_area_below_minimum_is_rejected() {
        let options = SessionOptions {
            mode: CaptureMode::Area,
            area: Some(Rectangle::new(10.0, 10.0, 40.0, 40.0)),
            ..Default::default()
        };
        assert!(matches!(
            CaptureSession::from_options(options, &SelectionConfig::default()),
            Err(RecordingError::Selection(SelectionError::TooSmall { .. }))
        ));
    }

    #[test]
    fn test_full_screen_ignores_area() {
        let options = SessionOptions {
            mode: CaptureMode::FullScreen,
            area: Some(Rectangle::new(0.0, 0.0, 100.0, 100.0)),
            ..Default::default()
        };
        let session = CaptureSession::from_options(options, &SelectionConfig::default()).unwrap();
        assert_eq!(session.area, None);
    }

    #[test]
    fn test_missing_anchor_defaults() {
        let options: SessionOptions = serde_json::from_str(r#"{ "mode": "full-screen" }"#).unwrap();
        assert_eq!(options.webcam_anchor, WebcamAnchor::BottomRight);
        assert!(!options.with_audio);
    }
}
