//! avdegrade: live capture through an H.264 degrade round trip, played back in sync

use std::path::PathBuf;

use avdegrade::audio::{AudioSink, AudioSource, CpalCapture, CpalPlayback, NullSink, ToneSource};
use avdegrade::capture::{SyntheticCapture, V4l2Capture, VideoSource};
use avdegrade::display::Sdl2Display;
use avdegrade::pipeline::{Devices, Pipeline};
use avdegrade::{utils, AudioBackend, Config, VideoBackend};
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "avdegrade.toml";

/// Chunks of slack between the sound card callback and the pipeline.
const CAPTURE_BUFFER_CHUNKS: usize = 4;
const PLAYBACK_BUFFER_CHUNKS: usize = 2;

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("avdegrade=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("avdegrade launching...");

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load(Some(&path))
        .wrap_err_with(|| format!("loading configuration from {}", path.display()))?;
    info!(?config, "configuration loaded");

    let devices = Devices {
        video: open_video(&config).wrap_err("opening video source")?,
        audio: open_audio(&config).wrap_err("opening audio devices")?,
        render: Box::new(
            Sdl2Display::new(&config.display, config.video.width, config.video.height)
                .wrap_err("opening display")?,
        ),
    };

    Pipeline::new(&config, devices)
        .wrap_err("building pipeline")?
        .run()
        .wrap_err("pipeline failed")?;

    info!("avdegrade shutting down");
    Ok(())
}

fn open_video(config: &Config) -> Result<Box<dyn VideoSource>> {
    let video = &config.video;
    let source: Box<dyn VideoSource> = match video.backend {
        VideoBackend::V4l2 => {
            // Auto-detect capture device if needed
            let path = if video.device.is_empty() {
                utils::auto_detect_device(video.format)?
            } else {
                video.device.clone()
            };
            info!("Using capture device: {path}");
            Box::new(V4l2Capture::open(&path, video.width, video.height, video.format)?)
        }
        VideoBackend::Synthetic => Box::new(SyntheticCapture::new(
            video.format,
            video.width,
            video.height,
            video.fps,
        )?),
    };
    Ok(source)
}

#[allow(clippy::type_complexity)]
fn open_audio(config: &Config) -> Result<Option<(Box<dyn AudioSource>, Box<dyn AudioSink>)>> {
    if !config.audio.enabled {
        return Ok(None);
    }
    let format = config.audio_format();
    let chunk_len = format.chunk_len(config.video.fps);

    let devices: (Box<dyn AudioSource>, Box<dyn AudioSink>) = match config.audio.backend {
        AudioBackend::Device => (
            Box::new(CpalCapture::open(
                &config.audio.source,
                format,
                chunk_len * CAPTURE_BUFFER_CHUNKS,
            )?),
            Box::new(CpalPlayback::open(
                &config.audio.sink,
                format,
                chunk_len * PLAYBACK_BUFFER_CHUNKS,
            )?),
        ),
        AudioBackend::Tone => (Box::new(ToneSource::new(format)?), Box::new(NullSink::new())),
    };
    Ok(Some(devices))
}
