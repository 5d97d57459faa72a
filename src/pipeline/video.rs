//! Video capture and playback roles

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use tracing::{debug, trace};

use super::pacer::Pacer;
use super::ringbuf::FrameRing;
use super::sync::{Stream, SyncController};
use crate::archive::ArchiveSink;
use crate::capture::frame::Frame;
use crate::capture::normalize::Normalizer;
use crate::capture::VideoSource;
use crate::codec::degrade::DegradeEngine;
use crate::codec::h264::{H264Decoder, H264Encoder};
use crate::codec::{Outcome, VideoDecoder, VideoEncoder};
use crate::display::RenderSink;
use crate::error::{Error, Result};

/// Build a ring of `capacity` placeholder frames.
pub fn frame_ring(capacity: usize, width: u32, height: u32) -> Result<FrameRing> {
    FrameRing::new(capacity, || Frame::placeholder(width, height))
}

/// Pulls frames off the device and writes them, normalized, into the ring.
pub struct VideoCapture<S> {
    source: S,
    normalizer: Normalizer,
    ring: Arc<FrameRing>,
    pacer: Option<Pacer>,
}

impl<S: VideoSource> VideoCapture<S> {
    pub fn new(source: S, width: u32, height: u32, ring: Arc<FrameRing>) -> Result<Self> {
        let normalizer = Normalizer::new(source.format(), width, height)?;
        Ok(Self {
            source,
            normalizer,
            ring,
            pacer: None,
        })
    }

    /// Gate each step to a fixed wall-clock schedule.
    pub fn paced(mut self, fps: u32) -> Self {
        self.pacer = Some(Pacer::from_fps(fps));
        self
    }

    /// Wait for a free slot, read one device frame into it, publish it.
    pub fn step(&mut self) -> Result<()> {
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }

        let mut slot = self.ring.acquire_back()?;
        let raw = self.source.next_frame()?;
        let outcome = self.normalizer.normalize(raw, &mut slot)?;
        slot.release()?;

        counter!("frames_captured").increment(1);
        if outcome == Outcome::Placeholder {
            debug!("capture produced no image yet, queued placeholder");
        }
        Ok(())
    }
}

/// Optional dumps on either side of the degrade round trip.
#[derive(Default)]
pub struct Archives {
    /// Normalized capture, before degradation.
    pub before: Option<ArchiveSink>,
    /// Degraded output. Should skip the first frame, which is start-up output.
    pub after: Option<ArchiveSink>,
}

impl Archives {
    fn flush(&mut self) -> Result<()> {
        for sink in [&mut self.before, &mut self.after].into_iter().flatten() {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Degrades, archives and renders ring frames in lock-step with audio.
pub struct VideoPlayback<R, E = H264Encoder, D = H264Decoder> {
    sink: R,
    engine: DegradeEngine<E, D>,
    ring: Arc<FrameRing>,
    /// `None` in video-only mode.
    sync: Option<Arc<SyncController>>,
    archives: Archives,
    degraded: Frame,
}

impl<R: RenderSink, E: VideoEncoder, D: VideoDecoder> VideoPlayback<R, E, D> {
    pub fn new(
        sink: R,
        engine: DegradeEngine<E, D>,
        ring: Arc<FrameRing>,
        sync: Option<Arc<SyncController>>,
    ) -> Result<Self> {
        let degraded = Frame::placeholder(engine.width(), engine.height())?;
        Ok(Self {
            sink,
            engine,
            ring,
            sync,
            archives: Archives::default(),
            degraded,
        })
    }

    pub fn with_archives(mut self, archives: Archives) -> Self {
        self.archives = archives;
        self
    }

    /// Take the oldest frame, count the tick, degrade, archive, render,
    /// then retire the slot.
    pub fn step(&mut self) -> Result<()> {
        let slot = self.ring.front()?;
        if let Some(sync) = &self.sync {
            let tick = sync.tick(Stream::Video)?;
            trace!(tick, "video tick");
        }

        if let Some(before) = self.archives.before.as_mut() {
            before.write(&slot)?;
        }
        let outcome = self.engine.degrade(&slot, &mut self.degraded)?;
        if outcome == Outcome::Placeholder {
            trace!("round trip produced no frame, showing placeholder");
        }
        if let Some(after) = self.archives.after.as_mut() {
            after.write(&self.degraded)?;
        }

        let started = Instant::now();
        self.sink.draw(&self.degraded)?;
        histogram!("render_time_us").record(started.elapsed().as_micros() as f64);

        slot.pop()?;
        gauge!("ring_occupancy").set(self.ring.occupancy()? as f64);
        Ok(())
    }

    /// Run steps until one fails. A closed render sink ends playback
    /// cleanly; archives are flushed either way.
    pub fn run(&mut self) -> Result<()> {
        let result = loop {
            if let Err(e) = self.step() {
                break e;
            }
        };
        self.archives.flush()?;
        match result {
            Error::SinkClosed => {
                debug!("render sink closed, playback stopped");
                Ok(())
            }
            e => Err(e),
        }
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn engine(&self) -> &DegradeEngine<E, D> {
        &self.engine
    }
}
