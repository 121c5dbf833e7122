//! FFmpeg command lines and capability detection.

use open_screencast::capture::ffmpeg::build_capture_args;
use open_screencast::capture::Resolution;
use open_screencast::recorder::ffmpeg::build_encoder_args;
use open_screencast::recorder::{
    negotiate_codec, AudioTrack, EncoderFactory, EncoderSettings, FfmpegEncoderFactory, RecordingError,
    StreamDescriptor, VideoCodec,
};
use open_screencast::utils::ffmpeg::parse_encoder_list;

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[test]
fn test_encoder_args_video_only() {
    let stream = StreamDescriptor {
        resolution: Resolution::new(1280, 720),
        fps: 30,
        audio: None,
    };
    let args = build_encoder_args(VideoCodec::Vp9, &EncoderSettings::default(), &stream);

    assert_eq!(value_after(&args, "-video_size"), Some("1280x720"));
    assert_eq!(value_after(&args, "-framerate"), Some("30"));
    assert_eq!(value_after(&args, "-c:v"), Some("libvpx-vp9"));
    assert_eq!(value_after(&args, "-b:v"), Some("5000000"));
    assert_eq!(value_after(&args, "-cluster_time_limit"), Some("1000"));
    assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
    assert!(!args.iter().any(|a| a == "-c:a"));
    assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
}

#[test]
fn test_encoder_args_with_system_audio() {
    let stream = StreamDescriptor {
        resolution: Resolution::new(320, 181),
        fps: 30,
        audio: Some(AudioTrack {
            label: "Monitor of Built-in Audio".to_string(),
            input_format: "pulse".to_string(),
            input: "alsa_output.pci.monitor".to_string(),
        }),
    };
    let args = build_encoder_args(VideoCodec::Vp8, &EncoderSettings::default(), &stream);

    let inputs: Vec<&str> = args
        .iter()
        .enumerate()
        .filter(|(_, a)| *a == "-i")
        .map(|(i, _)| args[i + 1].as_str())
        .collect();
    assert_eq!(inputs, vec!["-", "alsa_output.pci.monitor"]);
    assert_eq!(value_after(&args, "-c:v"), Some("libvpx"));
    assert_eq!(value_after(&args, "-c:a"), Some("libopus"));
    assert_eq!(value_after(&args, "-b:a"), Some("128000"));
    assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a"));
}

#[test]
fn test_capture_args() {
    let args = build_capture_args("x11grab", ":0.0", 30);

    assert_eq!(value_after(&args, "-f"), Some("x11grab"));
    assert_eq!(value_after(&args, "-i"), Some(":0.0"));
    assert_eq!(value_after(&args, "-pix_fmt"), Some("rgba"));
    assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
}

#[test]
fn test_codec_negotiation_against_reported_encoders() {
    let listing = "\
Encoders:
 V..... = Video
 ------
 V....D libvpx               libvpx VP8 (codec vp8)
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 A....D libopus              libopus Opus (codec opus)
";
    let factory = FfmpegEncoderFactory::with_encoders(parse_encoder_list(listing));

    assert!(!factory.supports(VideoCodec::Vp9));
    assert!(factory.supports(VideoCodec::Vp8));
    assert_eq!(
        negotiate_codec(&factory, &[VideoCodec::Vp9, VideoCodec::Vp8]).unwrap(),
        VideoCodec::Vp8
    );
    assert!(matches!(
        factory.create(VideoCodec::Vp9, &EncoderSettings::default()),
        Err(RecordingError::EncodingError(_))
    ));
}

#[test]
fn test_no_supported_codec() {
    let factory = FfmpegEncoderFactory::with_encoders(vec!["libx264".to_string()]);
    let err = negotiate_codec(&factory, &[VideoCodec::Vp9, VideoCodec::Vp8]).unwrap_err();
    assert!(matches!(err, RecordingError::EncodingError(_)));
}
