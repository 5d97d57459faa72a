//! Encode → parse → decode round trip used as a lossy quality filter

use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, instrument, trace};

use super::annexb::AnnexBParser;
use super::h264::{H264Decoder, H264Encoder};
use super::{Outcome, VideoDecoder, VideoEncoder};
use crate::capture::frame::Frame;
use crate::error::{Error, Result};
use crate::CodecConfig;

/// Where a round trip currently is. Only observable as `Idle` from outside,
/// since the engine lock is held for the whole trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Encoding,
    Parsing,
    Decoding,
}

struct RoundTrip<E, D> {
    encoder: E,
    decoder: D,
    parser: AnnexBParser,
    /// Presentation timestamp of the next submitted frame, one tick per call.
    pts: u64,
    state: State,
}

/// Paired encoder/decoder performing one degrade round trip per call.
///
/// Calls are serialized on an internal lock: the codec contexts are not
/// reentrant, so two concurrent callers block rather than interleave.
pub struct DegradeEngine<E = H264Encoder, D = H264Decoder> {
    inner: Mutex<RoundTrip<E, D>>,
    width: u32,
    height: u32,
}

impl DegradeEngine {
    /// Constant-QP intra-only H.264 engine for frames of the given geometry.
    pub fn h264(width: u32, height: u32, fps: u32, codec: &CodecConfig) -> Result<Self> {
        let encoder = H264Encoder::new(width, height, fps, codec)?;
        let decoder = H264Decoder::new()?;
        Ok(Self::with_codecs(width, height, encoder, decoder))
    }
}

impl<E: VideoEncoder, D: VideoDecoder> DegradeEngine<E, D> {
    pub fn with_codecs(width: u32, height: u32, encoder: E, decoder: D) -> Self {
        Self {
            inner: Mutex::new(RoundTrip {
                encoder,
                decoder,
                parser: AnnexBParser::new(),
                pts: 0,
                state: State::Idle,
            }),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of round trips completed so far.
    pub fn frames_processed(&self) -> Result<u64> {
        Ok(self.lock()?.pts)
    }

    pub fn state(&self) -> Result<State> {
        Ok(self.lock()?.state)
    }

    /// Push `input` through the codec and write the result into `output`.
    ///
    /// When the decoder produces nothing for this call, `output` is filled
    /// with the placeholder frame and [`Outcome::Placeholder`] is returned.
    #[instrument(level = "trace", skip_all)]
    pub fn degrade(&self, input: &Frame, output: &mut Frame) -> Result<Outcome> {
        for frame in [input, &*output] {
            if frame.width() != self.width || frame.height() != self.height {
                return Err(Error::codec(format!(
                    "engine opened for {}x{}, got {}x{} frame",
                    self.width,
                    self.height,
                    frame.width(),
                    frame.height()
                )));
            }
        }

        let started = Instant::now();
        let mut trip = self.lock()?;
        let outcome = match trip.run(input, output) {
            Ok(outcome) => outcome,
            Err(e) => {
                trip.reset();
                return Err(e);
            }
        };

        metrics::histogram!("degrade_time_us").record(started.elapsed().as_micros() as f64);
        metrics::counter!("frames_degraded").increment(1);
        if outcome == Outcome::Placeholder {
            metrics::counter!("placeholder_frames").increment(1);
        }
        Ok(outcome)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RoundTrip<E, D>>> {
        self.inner.lock().map_err(|_| Error::Poisoned("degrade engine"))
    }
}

impl<E: VideoEncoder, D: VideoDecoder> RoundTrip<E, D> {
    /// Back to `Idle` with nothing buffered after a failed trip.
    fn reset(&mut self) {
        self.state = State::Idle;
        self.parser = AnnexBParser::new();
    }

    fn run(&mut self, input: &Frame, output: &mut Frame) -> Result<Outcome> {
        let pts = self.pts;

        self.state = State::Encoding;
        let units = self.encoder.encode(input, pts)?;
        if units.len() > 1 {
            return Err(Error::codec(format!(
                "encoder emitted {} units for frame {pts}, low-latency configuration violated",
                units.len()
            )));
        }

        self.state = State::Parsing;
        let mut decoded = false;
        for unit in &units {
            self.parser.push(unit);
            while let Some(packet) = self.parser.next_packet() {
                self.state = State::Decoding;
                decoded |= self.decoder.decode(&packet, output)?;
            }
            // the unit is complete, so its tail is a whole packet too
            if let Some(packet) = self.parser.flush() {
                self.state = State::Decoding;
                decoded |= self.decoder.decode(&packet, output)?;
            }
        }

        self.state = State::Idle;
        self.pts += 1;

        if decoded {
            trace!(pts, "round trip produced a frame");
            Ok(Outcome::Decoded)
        } else {
            debug!(pts, units = units.len(), "round trip produced no frame, using placeholder");
            output.fill_placeholder();
            Ok(Outcome::Placeholder)
        }
    }
}
