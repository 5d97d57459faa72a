pub mod archive;
pub mod audio;
pub mod capture;
pub mod codec;
pub mod display;
pub mod error;
pub mod pipeline;
#[cfg(feature = "v4l2")]
pub mod utils;

use std::path::{Path, PathBuf};

use capture::frame::PixelFormat;
use codec::h264::MAX_QUANTIZER;
use pipeline::sync::WaitPolicy;
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

/// Environment prefix for overrides, e.g. `AVDEGRADE_CODEC__QUANTIZER=40`.
pub const ENV_PREFIX: &str = "AVDEGRADE";

/// System configuration, read once at start-up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub codec: CodecConfig,
    pub pipeline: PipelineConfig,
    pub archive: ArchiveConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoBackend {
    V4l2,
    /// Built-in moving test pattern.
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub backend: VideoBackend,
    /// Device path; empty selects the first capable `/dev/videoN`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    /// Gate capture to a wall-clock schedule instead of the device's pace.
    pub pace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioBackend {
    /// Sound card capture and playback.
    Device,
    /// Sine tone source and a discarding sink.
    Tone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// When off, video plays alone and is not tick-synchronized.
    pub enabled: bool,
    pub backend: AudioBackend,
    /// Capture device name; empty selects the system default.
    pub source: String,
    /// Playback device name; empty selects the system default.
    pub sink: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// FIFO capacity in chunks; defaults to the video delay.
    pub delay: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Fixed quantization parameter, used as both QP min and max.
    pub quantizer: u8,
    pub bitrate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame ring capacity: the capture → playback delay in frames.
    pub delay: usize,
    pub wait_policy: WaitPolicy,
    /// Pin each pipeline thread to its own core.
    pub pin_threads: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Y4M dump of normalized frames before degradation.
    pub before: Option<PathBuf>,
    /// Y4M dump of degraded frames.
    pub after: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            backend: VideoBackend::V4l2,
            device: "/dev/video0".into(),
            width: 1280,
            height: 720,
            fps: 30,
            format: PixelFormat::Mjpeg,
            pace: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: AudioBackend::Device,
            source: String::new(),
            sink: String::new(),
            sample_rate: 44_100,
            channels: 2,
            delay: None,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            quantizer: 26,
            bitrate: 5 << 20,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delay: 8,
            wait_policy: WaitPolicy::Spin,
            pin_threads: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "avdegrade".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            codec: CodecConfig::default(),
            pipeline: PipelineConfig::default(),
            archive: ArchiveConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `AVDEGRADE_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| Error::config(format!("default configuration: {e}")))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let video = &self.video;
        if video.width == 0 || video.height == 0 || video.width % 2 != 0 || video.height % 2 != 0
        {
            return Err(Error::config(format!(
                "video geometry {}x{} must be non-zero and even",
                video.width, video.height
            )));
        }
        if video.fps == 0 {
            return Err(Error::config("video fps must be at least 1"));
        }
        if self.pipeline.delay == 0 {
            return Err(Error::config("pipeline delay must be at least 1 frame"));
        }
        if self.codec.quantizer > MAX_QUANTIZER {
            return Err(Error::config(format!(
                "quantizer {} outside 0..={MAX_QUANTIZER}",
                self.codec.quantizer
            )));
        }
        if self.audio.enabled {
            if self.audio.delay == Some(0) {
                return Err(Error::config("audio delay must be at least 1 chunk"));
            }
            if self.audio_format().chunk_len(video.fps) == 0 {
                return Err(Error::config(format!(
                    "{} Hz x {} channels is too little audio for one chunk at {} fps",
                    self.audio.sample_rate, self.audio.channels, video.fps
                )));
            }
        }
        Ok(())
    }

    pub fn audio_format(&self) -> audio::AudioFormat {
        audio::AudioFormat {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
        }
    }

    pub fn audio_delay(&self) -> usize {
        self.audio.delay.unwrap_or(self.pipeline.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn load_without_file_matches_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.video.width, 1280);
        assert_eq!(config.video.format, PixelFormat::Mjpeg);
        assert_eq!(config.audio_delay(), config.pipeline.delay);
    }

    #[test]
    fn odd_geometry_and_bad_quantizer_are_rejected() {
        let mut config = Config::default();
        config.video.width = 641;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.codec.quantizer = 52;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.delay = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_audio_rate_is_rejected_only_when_audio_is_on() {
        let mut config = Config::default();
        config.audio.sample_rate = 10;
        config.audio.channels = 1;
        assert!(config.validate().is_err());
        config.audio.enabled = false;
        config.validate().unwrap();
    }
}
