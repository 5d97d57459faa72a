//! Capture → delay → degrade → synchronized playback orchestration

pub mod audio;
pub mod pacer;
pub mod ringbuf;
pub mod sync;
pub mod video;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use self::audio::{audio_fifo, AudioCapture, AudioPlayback};
use self::sync::SyncController;
use self::video::{frame_ring, Archives, VideoCapture, VideoPlayback};
use crate::archive::ArchiveSink;
use crate::audio::{AudioSink, AudioSource};
use crate::capture::VideoSource;
use crate::codec::DegradeEngine;
use crate::display::RenderSink;
use crate::error::{Error, Result};
use crate::Config;

/// Opened endpoints handed to the pipeline.
pub struct Devices {
    pub video: Box<dyn VideoSource>,
    /// Capture and playback pair; required when audio is enabled.
    pub audio: Option<(Box<dyn AudioSource>, Box<dyn AudioSink>)>,
    pub render: Box<dyn RenderSink>,
}

struct AudioRoles {
    capture: AudioCapture<Box<dyn AudioSource>>,
    playback: AudioPlayback<Box<dyn AudioSink>>,
}

/// The four pipeline roles, wired to their shared ring, FIFO and sync
/// controller.
pub struct Pipeline {
    video_capture: VideoCapture<Box<dyn VideoSource>>,
    video_playback: VideoPlayback<Box<dyn RenderSink>>,
    audio: Option<AudioRoles>,
    pin_threads: bool,
}

impl Pipeline {
    /// Allocate every buffer and codec context up front.
    pub fn new(config: &Config, devices: Devices) -> Result<Self> {
        config.validate()?;
        let video = &config.video;
        let (width, height, fps) = (video.width, video.height, video.fps);

        let ring = Arc::new(frame_ring(config.pipeline.delay, width, height)?);
        let engine = DegradeEngine::h264(width, height, fps, &config.codec)?;

        let mut video_capture =
            VideoCapture::new(devices.video, width, height, Arc::clone(&ring))?;
        if video.pace {
            video_capture = video_capture.paced(fps);
        }

        let (audio, sync) = match (config.audio.enabled, devices.audio) {
            (true, Some((source, sink))) => {
                let chunk_len = config.audio_format().chunk_len(fps);
                let fifo = Arc::new(audio_fifo(config.audio_delay(), chunk_len)?);
                let sync = Arc::new(SyncController::new(config.pipeline.wait_policy));
                info!(
                    chunk_len,
                    delay = config.audio_delay(),
                    policy = ?config.pipeline.wait_policy,
                    "audio enabled"
                );
                let roles = AudioRoles {
                    capture: AudioCapture::new(source, Arc::clone(&fifo)),
                    playback: AudioPlayback::new(sink, fifo, Arc::clone(&sync)),
                };
                (Some(roles), Some(sync))
            }
            (true, None) => {
                return Err(Error::config("audio is enabled but no audio devices were given"));
            }
            (false, devices) => {
                if devices.is_some() {
                    debug!("audio disabled, ignoring audio devices");
                }
                info!("video-only mode");
                (None, None)
            }
        };

        let archives = Archives {
            before: match &config.archive.before {
                Some(path) => Some(ArchiveSink::create(path, width, height, fps)?),
                None => None,
            },
            after: match &config.archive.after {
                Some(path) => Some(ArchiveSink::create(path, width, height, fps)?.skip_first(1)),
                None => None,
            },
        };
        let video_playback =
            VideoPlayback::new(devices.render, engine, ring, sync)?.with_archives(archives);

        info!(
            width,
            height,
            fps,
            delay = config.pipeline.delay,
            quantizer = config.codec.quantizer,
            "pipeline ready"
        );

        Ok(Self {
            video_capture,
            video_playback,
            audio,
            pin_threads: config.pipeline.pin_threads,
        })
    }

    /// Run until the render sink closes.
    ///
    /// Video capture and both audio roles get their own threads; video
    /// playback runs on the calling thread, which owns the render sink.
    /// There is no shutdown path: a failure on any background thread is
    /// logged and terminates the process.
    pub fn run(self) -> Result<()> {
        let cores = if self.pin_threads {
            let cores = core_affinity::get_core_ids().unwrap_or_default();
            if cores.is_empty() {
                warn!("thread pinning requested but no core ids are available");
            }
            cores
        } else {
            Vec::new()
        };
        let core = |role: usize| cores.get(role % cores.len().max(1)).copied();

        let Self {
            mut video_capture,
            mut video_playback,
            audio,
            ..
        } = self;

        let mut workers = vec![spawn_role("video-capture", core(0), move || {
            video_capture.step()
        })?];
        if let Some(AudioRoles {
            mut capture,
            mut playback,
        }) = audio
        {
            workers.push(spawn_role("audio-capture", core(1), move || capture.step())?);
            workers.push(spawn_role("audio-playback", core(2), move || playback.step())?);
        }

        pin("video-playback", core(3));
        info!(threads = workers.len() + 1, "pipeline running");
        video_playback.run()?;

        info!("playback finished");
        Ok(())
    }
}

fn pin(role: &str, core: Option<core_affinity::CoreId>) {
    if let Some(core) = core {
        if core_affinity::set_for_current(core) {
            debug!(role, core = core.id, "pinned");
        } else {
            warn!(role, core = core.id, "failed to pin thread");
        }
    }
}

/// Spawn a thread running `step` forever. Any error is fatal for the process.
fn spawn_role<F>(
    role: &'static str,
    core: Option<core_affinity::CoreId>,
    mut step: F,
) -> Result<JoinHandle<()>>
where
    F: FnMut() -> Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name(role.to_owned())
        .spawn(move || {
            pin(role, core);
            loop {
                if let Err(e) = step() {
                    error!(role, "fatal pipeline error: {e}");
                    std::process::exit(1);
                }
            }
        })
        .map_err(|e| Error::config(format!("spawning {role}: {e}")))
}
