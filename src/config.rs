//! Recorder configuration
//!
//! Every field has a default so a partial JSON file (or none at all) is a
//! valid configuration.

use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::recorder::encoder::EncoderSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    pub encoder: EncoderSettings,
    pub overlay: OverlayConfig,
    pub selection: SelectionConfig,
    pub probe: ProbeConfig,
    pub capture: CaptureBackendConfig,
}

impl RecorderConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> RecordingResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecordingError::ConfigurationError(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_json(&content)?;
        tracing::info!("Loaded recorder config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> RecordingResult<Self> {
        serde_json::from_str(content).map_err(|e| {
            RecordingError::ConfigurationError(format!("Failed to parse config: {}", e))
        })
    }
}

/// Webcam overlay geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayConfig {
    /// Diameter of the circular overlay in surface pixels
    pub diameter: u32,
    /// Distance from the anchored surface edges
    pub inset: u32,
    /// Width of the ring stroked around the overlay
    pub border_width: f64,
    /// Ring color as RGBA
    pub border_color: [u8; 4],
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            diameter: 150,
            inset: 20,
            border_width: 3.0,
            border_color: [255, 255, 255, 255],
        }
    }
}

/// Minimum accepted area selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionConfig {
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_width: 50,
            min_height: 50,
        }
    }
}

/// Duration prober bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeConfig {
    /// Upper seek bound in seconds
    pub ceiling_secs: f64,
    /// Search stops once the bracket is narrower than this
    pub resolution_secs: f64,
    /// Wall-clock limit for the whole search
    pub timeout_ms: u64,
    /// Reported when no seek ever made progress
    pub fallback_secs: f64,
    /// Limit for restoring the playback position afterwards
    pub restore_timeout_ms: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_millis(self.restore_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ceiling_secs: 3600.0,
            resolution_secs: 0.5,
            timeout_ms: 5000,
            fallback_secs: 30.0,
            restore_timeout_ms: 1000,
        }
    }
}

/// FFmpeg input devices used by the capture backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureBackendConfig {
    pub screen_format: String,
    pub screen_input: String,
    pub camera_format: String,
    pub camera_input: String,
    /// Explicit system audio input; when unset the platform default is used
    pub audio_format: Option<String>,
    pub audio_input: Option<String>,
    /// How long to wait for a device to report its first stream
    pub acquire_timeout_ms: u64,
}

impl CaptureBackendConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for CaptureBackendConfig {
    fn default() -> Self {
        let (screen_format, screen_input, camera_format, camera_input) = if cfg!(target_os = "macos") {
            ("avfoundation", "1:none", "avfoundation", "0:none")
        } else if cfg!(target_os = "windows") {
            ("gdigrab", "desktop", "dshow", "video=Integrated Camera")
        } else {
            ("x11grab", ":0.0", "v4l2", "/dev/video0")
        };

        Self {
            screen_format: screen_format.to_string(),
            screen_input: std::env::var("DISPLAY")
                .ok()
                .filter(|_| screen_format == "x11grab")
                .unwrap_or_else(|| screen_input.to_string()),
            camera_format: camera_format.to_string(),
            camera_input: camera_input.to_string(),
            audio_format: None,
            audio_input: None,
            acquire_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.encoder.fps, 30);
        assert_eq!(config.encoder.video_bits_per_second, 5_000_000);
        assert_eq!(config.encoder.audio_bits_per_second, 128_000);
        assert_eq!(config.overlay.diameter, 150);
        assert_eq!(config.overlay.inset, 20);
        assert_eq!(config.selection.min_width, 50);
        assert_eq!(config.probe.timeout(), Duration::from_secs(5));
        assert_eq!(config.probe.fallback_secs, 30.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RecorderConfig::from_json(
            r#"{ "overlay": { "diameter": 200 }, "probe": { "timeoutMs": 2000 } }"#,
        )
        .unwrap();

        assert_eq!(config.overlay.diameter, 200);
        assert_eq!(config.overlay.inset, 20);
        assert_eq!(config.probe.timeout_ms, 2000);
        assert_eq!(config.probe.ceiling_secs, 3600.0);
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        let err = RecorderConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, RecordingError::ConfigurationError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{ "encoder": { "fps": 24 } }"#).unwrap();

        let config = RecorderConfig::load(&path).unwrap();
        assert_eq!(config.encoder.fps, 24);
    }
}
