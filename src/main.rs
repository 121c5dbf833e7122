//! Command line recorder and trimmer.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use open_screencast::capture::{FfmpegSourceProvider, PointerInput, Rectangle, Resolution, WebcamAnchor};
use open_screencast::commands::processing::{self, EditorState, RECORDING_LABEL, TRIMMED_LABEL};
use open_screencast::commands::recording::{self, RecorderState};
use open_screencast::processing::{format_time, FfmpegMediaLoader, Trimmer};
use open_screencast::recorder::{
    CaptureMode, CompositorPipeline, FfmpegEncoderFactory, RecordingArtifact, RecordingCoordinator, SessionEvent,
    SessionOptions,
};
use open_screencast::RecorderConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "open-screencast")]
#[command(about = "Record the screen with a webcam overlay and trim recordings")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until Ctrl-C, the time limit or the end of the screen stream
    Record {
        #[arg(long, value_enum, default_value_t = ModeArg::FullScreen)]
        mode: ModeArg,

        /// Area to record in viewport pixels (x,y,w,h)
        #[arg(long, value_parser = parse_area)]
        area: Option<Rectangle>,

        /// Size of the viewport the area was picked in (WxH)
        #[arg(long, value_parser = parse_resolution)]
        viewport: Option<Resolution>,

        /// Overlay the webcam
        #[arg(long)]
        webcam: bool,

        /// Overlay corner: top-left, top-right, bottom-left, bottom-right
        #[arg(long, default_value = "bottom-right")]
        anchor: String,

        /// Attach system audio
        #[arg(long)]
        audio: bool,

        /// Stop recording after this many seconds
        #[arg(long)]
        seconds: Option<u64>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Trim a recording to [start, end)
    Trim {
        input: PathBuf,

        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Defaults to the end of the recording
        #[arg(long)]
        end: Option<f64>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Print the playable duration of a recording
    Probe { input: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    FullScreen,
    Window,
    Area,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::FullScreen => CaptureMode::FullScreen,
            ModeArg::Window => CaptureMode::Window,
            ModeArg::Area => CaptureMode::Area,
        }
    }
}

fn parse_area(s: &str) -> Result<Rectangle, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err("Area must be x,y,w,h".to_string());
    }
    let x = parts[0].trim().parse().map_err(|_| "Invalid x".to_string())?;
    let y = parts[1].trim().parse().map_err(|_| "Invalid y".to_string())?;
    let w = parts[2].trim().parse().map_err(|_| "Invalid w".to_string())?;
    let h = parts[3].trim().parse().map_err(|_| "Invalid h".to_string())?;
    Ok(Rectangle::new(x, y, w, h))
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    let (w, h) = s.split_once('x').ok_or_else(|| "Viewport must be WxH".to_string())?;
    let width = w.trim().parse().map_err(|_| "Invalid width".to_string())?;
    let height = h.trim().parse().map_err(|_| "Invalid height".to_string())?;
    Ok(Resolution::new(width, height))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    open_screencast::init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };

    match cli.command {
        Commands::Record {
            mode,
            area,
            viewport,
            webcam,
            anchor,
            audio,
            seconds,
            output,
        } => {
            let options = SessionOptions {
                mode: mode.into(),
                with_webcam: webcam,
                with_audio: audio,
                webcam_anchor: WebcamAnchor::from(anchor.as_str()),
                area,
                viewport,
            };
            record(config, options, seconds, &output).await
        }
        Commands::Trim {
            input,
            start,
            end,
            output,
        } => trim(config, &input, start, end, &output).await,
        Commands::Probe { input } => {
            let editor = editor_state(&config)?;
            let artifact = read_recording(&input).await?;
            let duration = processing::probe_duration(&editor, &artifact)
                .await
                .map_err(anyhow::Error::msg)?;
            println!("{:.3}s ({})", duration, format_time(duration));
            Ok(())
        }
    }
}

async fn record(
    config: RecorderConfig,
    mut options: SessionOptions,
    seconds: Option<u64>,
    output: &Path,
) -> anyhow::Result<()> {
    let provider = Arc::new(FfmpegSourceProvider::new(config.capture.clone(), config.encoder.fps));
    let encoders = Arc::new(FfmpegEncoderFactory::detect()?);
    let pipeline = CompositorPipeline::new(config, provider, encoders);
    let state = RecorderState::new(RecordingCoordinator::new(pipeline));

    if options.mode == CaptureMode::Area {
        let area = options
            .area
            .context("--area is required with --mode area")?;
        // Without a viewport the area is taken in screen pixels
        let bounds = options.viewport.unwrap_or_else(|| {
            Resolution::new(
                (area.x + area.width).ceil().max(1.0) as u32,
                (area.y + area.height).ceil().max(1.0) as u32,
            )
        });

        let (tx, rx) = mpsc::channel(4);
        tx.send(PointerInput::Down { x: area.x, y: area.y }).await?;
        tx.send(PointerInput::Up {
            x: area.x + area.width,
            y: area.y + area.height,
        })
        .await?;
        drop(tx);

        let selected = recording::request_area_selection(&state, rx, bounds)
            .await
            .map_err(anyhow::Error::msg)?;
        options.area = Some(selected);
    }

    let mut events = recording::session_events(&state).await;
    let session_id = recording::start_session(&state, options)
        .await
        .map_err(anyhow::Error::msg)?;
    eprintln!("Recording session {} (Ctrl-C to stop)", session_id);

    let limit = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let stream_ended = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::SessionStopped { .. }) => break,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => std::future::pending::<()>().await,
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        _ = limit => tracing::info!("Time limit reached"),
        _ = stream_ended => tracing::info!("Recording ended on its own"),
    }

    let artifact = recording::stop_session(&state)
        .await
        .map_err(anyhow::Error::msg)?;
    let path = processing::export_recording(&artifact, output, RECORDING_LABEL)
        .await
        .map_err(anyhow::Error::msg)?;
    println!("{}", path.display());
    Ok(())
}

async fn trim(config: RecorderConfig, input: &Path, start: f64, end: Option<f64>, output: &Path) -> anyhow::Result<()> {
    let editor = editor_state(&config)?;
    let artifact = read_recording(input).await?;

    let duration = processing::probe_duration(&editor, &artifact)
        .await
        .map_err(anyhow::Error::msg)?;
    let end = end.unwrap_or(duration);
    eprintln!(
        "Trimming {} - {} of {}",
        format_time(start),
        format_time(end),
        format_time(duration)
    );

    let trimmed = processing::trim_recording(&editor, &artifact, start, end, duration, |progress| {
        eprint!("\r{:3.0}%", progress * 100.0);
    })
    .await
    .map_err(anyhow::Error::msg)?;
    eprintln!();

    let label = if trimmed.same_bytes(&artifact) {
        RECORDING_LABEL
    } else {
        TRIMMED_LABEL
    };
    let path = processing::export_recording(&trimmed, output, label)
        .await
        .map_err(anyhow::Error::msg)?;
    println!("{}", path.display());
    Ok(())
}

fn editor_state(config: &RecorderConfig) -> anyhow::Result<EditorState> {
    let loader = Arc::new(FfmpegMediaLoader::new(config.encoder.fps));
    let encoders = Arc::new(FfmpegEncoderFactory::detect()?);
    Ok(EditorState::new(Trimmer::new(loader, encoders, config)))
}

async fn read_recording(path: &Path) -> anyhow::Result<RecordingArtifact> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(RecordingArtifact::new(bytes, "video/webm"))
}
