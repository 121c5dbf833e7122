//! Helpers shared by the FFmpeg-backed sources, encoder and player

use crate::capture::geometry::Resolution;
use crate::recorder::channel::{RecordingError, RecordingResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::process::{Command, Output, Stdio};

static STREAM_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{2,5})x(\d{2,5})\b").expect("stream size pattern is valid")
});

/// Check if FFmpeg is available
pub fn check_ffmpeg() -> RecordingResult<()> {
    match Command::new("ffmpeg").arg("-version").output() {
        Ok(output) if output.status.success() => Ok(()),
        _ => Err(RecordingError::ConfigurationError(
            "FFmpeg not found. Please install FFmpeg.".to_string(),
        )),
    }
}

/// Names of the encoders compiled into the local FFmpeg
pub fn list_encoders() -> RecordingResult<Vec<String>> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| RecordingError::ConfigurationError(format!("Failed to query FFmpeg encoders: {}", e)))?;

    encoders_from_output(&output)
}

fn encoders_from_output(output: &Output) -> RecordingResult<Vec<String>> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RecordingError::ConfigurationError(format!(
            "FFmpeg could not list encoders ({}): {}",
            output.status,
            last_lines(&stderr, 3)
        )));
    }
    Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Run a helper tool to completion and collect its output. The child is
/// killed if the returned future is dropped first, e.g. by a timeout.
pub async fn tool_output(program: &str, args: &[&str]) -> std::io::Result<Output> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    child.wait_with_output().await
}

/// Parse `ffmpeg -encoders` output: ` V....D libvpx-vp9  libvpx VP9 ...`
pub fn parse_encoder_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            let is_entry = flags.len() == 6 && flags.chars().all(|c| c.is_ascii_uppercase() || c == '.');
            if is_entry && name != "=" {
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Extract the frame size from an FFmpeg stream description line such as
/// `Stream #0:0: Video: rawvideo (RGBA / 0x41424752), rgba, 1920x1080, q=2-31`
pub fn parse_stream_size(line: &str) -> Option<Resolution> {
    if !line.contains("Video:") {
        return None;
    }
    // Skip hex codec tags like 0x41424752 by only accepting digits on both sides
    STREAM_SIZE.captures_iter(line).find_map(|caps| {
        let width = caps.get(1)?.as_str().parse().ok()?;
        let height = caps.get(2)?.as_str().parse().ok()?;
        Some(Resolution::new(width, height))
    })
}

/// Map an FFmpeg failure while opening a device to the recorder taxonomy
pub fn classify_open_failure(stderr: &str) -> RecordingError {
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") || lower.contains("not authorized") || lower.contains("not permitted") {
        RecordingError::PermissionDenied(last_lines(stderr, 3))
    } else {
        tracing::debug!("Device open failed: {}", last_lines(stderr, 5));
        RecordingError::NoStreamAvailable
    }
}

/// The final `count` non-empty lines of FFmpeg's stderr
pub fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Gets the default PulseAudio/PipeWire monitor source for system audio capture.
pub fn default_monitor_source() -> Option<String> {
    let output = Command::new("pactl")
        .args(["get-default-sink"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let sink_name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sink_name.is_empty() {
        return None;
    }

    Some(format!("{}.monitor", sink_name))
}

/// Subset of `ffprobe -of json` output the player needs
#[derive(Debug, Default, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    #[serde(default)]
    pub format: Option<ProbeFormat>,
    #[serde(default)]
    pub frames: Vec<ProbeFrame>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeStream {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeFormat {
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeFrame {
    pub best_effort_timestamp_time: Option<String>,
    pub pts_time: Option<String>,
}

impl ProbeOutput {
    pub fn parse(json: &str) -> RecordingResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| RecordingError::ExportFailure(format!("Failed to parse ffprobe output: {}", e)))
    }

    pub fn video_size(&self) -> Option<Resolution> {
        self.streams.iter().find_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
            _ => None,
        })
    }

    /// Container duration; unknown durations (missing or `N/A`) are infinite
    pub fn declared_duration(&self) -> f64 {
        self.format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(f64::INFINITY)
    }

    /// Timestamp of the first decoded frame, if any
    pub fn first_frame_time(&self) -> Option<f64> {
        self.frames.iter().find_map(|f| {
            f.best_effort_timestamp_time
                .as_deref()
                .or(f.pts_time.as_deref())
                .and_then(|t| t.parse::<f64>().ok())
        })
    }
}
