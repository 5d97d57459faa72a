//! Blocking V4L2 capture over memory-mapped buffers

use tracing::{debug, info, instrument, trace};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::frame::{PixelFormat, SUPPORTED_FORMATS};
use super::VideoSource;
use crate::error::{Error, Result};

/// Driver-side buffers queued at once. The pipeline consumes one frame per
/// call, so a short queue keeps the capture latency low.
const BUFFER_COUNT: u32 = 2;

/// One opened camera streaming frames in a fixed format and geometry
pub struct V4l2Capture {
    path: String,
    format: PixelFormat,
    stream: MmapStream<'static>,
    sequence: u64,
    _device: Device,
}

impl V4l2Capture {
    /// Open `path`, negotiate `width`x`height` in `format` and start streaming.
    ///
    /// Fails at open time if the device cannot capture or the driver picks a
    /// different format or geometry.
    #[instrument(level = "debug")]
    pub fn open(path: &str, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(Error::config(format!("pixel format {format:?} is not supported")));
        }
        let open_err = |e: std::io::Error| Error::config(format!("{path}: {e}"));

        let device = Device::with_path(path).map_err(open_err)?;
        let caps = device.query_caps().map_err(open_err)?;
        info!(card = %caps.card, driver = %caps.driver, "opened {path}");

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::config(format!("{path} cannot capture video")));
        }

        let mut fmt = device.format().map_err(open_err)?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = FourCC::new(&format.fourcc());
        let applied = device.set_format(&fmt).map_err(open_err)?;

        if applied.fourcc != fmt.fourcc || applied.width != width || applied.height != height {
            return Err(Error::config(format!(
                "{path} negotiated {}x{} {}, wanted {width}x{height} {format:?}",
                applied.width, applied.height, applied.fourcc
            )));
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(open_err)?;
        debug!(buffers = BUFFER_COUNT, "capture stream started");

        Ok(Self {
            path: path.to_owned(),
            format,
            stream,
            sequence: 0,
            _device: device,
        })
    }
}

impl VideoSource for V4l2Capture {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn next_frame(&mut self) -> Result<&[u8]> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| Error::device(self.path.clone(), e))?;
        self.sequence += 1;

        // compressed formats fill only part of the mapped buffer
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        trace!(sequence = self.sequence, driver_sequence = meta.sequence, bytes = used);
        Ok(&buf[..used])
    }
}
