//! Bitstream codecs: the degrade round trip and the MJPEG source decoder

pub mod annexb;
pub mod degrade;
pub mod h264;
pub mod mjpeg;

use bytes::Bytes;

use crate::capture::frame::Frame;
use crate::error::Result;

pub use degrade::DegradeEngine;
pub use h264::{H264Decoder, H264Encoder};
pub use mjpeg::MjpegDecoder;

/// Result of one decode or round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The output frame holds freshly decoded pixels.
    Decoded,
    /// Nothing came out of the codec this call; the output holds the placeholder.
    Placeholder,
}

/// Encoder half of a round trip.
pub trait VideoEncoder: Send {
    /// Encode one frame stamped with `pts` (one tick per call) and return every
    /// compressed unit the encoder has ready. The low-latency configuration
    /// yields zero or one unit.
    fn encode(&mut self, frame: &Frame, pts: u64) -> Result<Vec<Bytes>>;
}

/// Decoder half of a round trip, fed one parsed packet at a time.
pub trait VideoDecoder: Send {
    /// Decode `packet` into `out`. Returns `true` when a frame was produced.
    fn decode(&mut self, packet: &[u8], out: &mut Frame) -> Result<bool>;
}

impl<T: VideoEncoder + ?Sized> VideoEncoder for Box<T> {
    fn encode(&mut self, frame: &Frame, pts: u64) -> Result<Vec<Bytes>> {
        (**self).encode(frame, pts)
    }
}

impl<T: VideoDecoder + ?Sized> VideoDecoder for Box<T> {
    fn decode(&mut self, packet: &[u8], out: &mut Frame) -> Result<bool> {
        (**self).decode(packet, out)
    }
}
