//! Motion-JPEG source decoder: streaming segment parser plus zune-jpeg

use bytes::{Buf, Bytes, BytesMut};
use tracing::{instrument, trace};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

use super::Outcome;
use crate::capture::frame::Frame;
use crate::error::{Error, Result};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;

fn is_rst(marker: u8) -> bool {
    (0xD0..=0xD7).contains(&marker)
}

/// Incrementally splits a byte stream into complete JPEG images.
///
/// Walks marker segments after SOI, skips the entropy-coded scan (honouring
/// byte stuffing and restart markers) and cuts at EOI. Bytes between images,
/// such as driver padding, are discarded.
#[derive(Debug, Default)]
pub struct JpegParser {
    pending: BytesMut,
}

impl JpegParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Next complete image, `None` while more bytes are needed.
    pub fn next_image(&mut self) -> Result<Option<Bytes>> {
        if !self.align_to_soi() {
            return Ok(None);
        }
        match self.image_len()? {
            Some(len) => Ok(Some(self.pending.split_to(len).freeze())),
            None => Ok(None),
        }
    }

    fn align_to_soi(&mut self) -> bool {
        match self.pending.windows(2).position(|w| w == [0xFF, SOI]) {
            Some(at) => {
                self.pending.advance(at);
                true
            }
            None => {
                // keep a trailing 0xFF, it may start the next SOI
                let keep = usize::from(self.pending.last() == Some(&0xFF));
                let drop = self.pending.len() - keep;
                self.pending.advance(drop);
                false
            }
        }
    }

    /// Length of the image at the head of `pending`, which starts with SOI.
    fn image_len(&self) -> Result<Option<usize>> {
        let buf = &self.pending[..];
        let mut pos = 2;

        loop {
            if pos + 2 > buf.len() {
                return Ok(None);
            }
            if buf[pos] != 0xFF {
                return Err(Error::codec(format!(
                    "jpeg: expected marker at offset {pos}, found {:#04x}",
                    buf[pos]
                )));
            }
            let marker = buf[pos + 1];
            match marker {
                0xFF => pos += 1,
                EOI => return Ok(Some(pos + 2)),
                SOI => return Err(Error::codec(format!("jpeg: nested SOI at offset {pos}"))),
                TEM => pos += 2,
                m if is_rst(m) => pos += 2,
                _ => {
                    if pos + 4 > buf.len() {
                        return Ok(None);
                    }
                    let len = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]) as usize;
                    if len < 2 {
                        return Err(Error::codec(format!(
                            "jpeg: segment {marker:#04x} with invalid length {len}"
                        )));
                    }
                    pos += 2 + len;
                    if marker == SOS {
                        match scan_end(buf, pos) {
                            Some(end) => pos = end,
                            None => return Ok(None),
                        }
                    }
                }
            }
        }
    }
}

/// Offset of the first real marker after entropy-coded data starting at `pos`.
fn scan_end(buf: &[u8], mut pos: usize) -> Option<usize> {
    while pos + 1 < buf.len() {
        if buf[pos] == 0xFF {
            match buf[pos + 1] {
                0x00 => pos += 2,
                0xFF => pos += 1,
                m if is_rst(m) => pos += 2,
                _ => return Some(pos),
            }
        } else {
            pos += 1;
        }
    }
    None
}

/// Decodes camera MJPEG into canonical 4:2:0 frames.
pub struct MjpegDecoder {
    parser: JpegParser,
    width: u32,
    height: u32,
}

impl MjpegDecoder {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        // validates geometry the same way frames do
        Frame::new(width, height)?;
        Ok(Self {
            parser: JpegParser::new(),
            width,
            height,
        })
    }

    /// Feed one captured buffer and write the last complete image into `out`.
    ///
    /// Parse or decode failures are fatal. When no complete image is
    /// available yet `out` receives the placeholder.
    #[instrument(level = "trace", skip_all, fields(bytes = data.len()))]
    pub fn decode(&mut self, data: &[u8], out: &mut Frame) -> Result<Outcome> {
        if out.width() != self.width || out.height() != self.height {
            return Err(Error::codec(format!(
                "mjpeg decoder opened for {}x{}, got {}x{} frame",
                self.width,
                self.height,
                out.width(),
                out.height()
            )));
        }

        self.parser.push(data);
        let mut decoded = false;
        while let Some(image) = self.parser.next_image()? {
            self.decode_image(&image, out)?;
            decoded = true;
        }

        if decoded {
            Ok(Outcome::Decoded)
        } else {
            trace!(pending = self.parser.pending_len(), "no complete jpeg yet");
            out.fill_placeholder();
            Ok(Outcome::Placeholder)
        }
    }

    fn decode_image(&self, image: &[u8], out: &mut Frame) -> Result<()> {
        let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::YCbCr);
        let mut decoder = JpegDecoder::new_with_options(image, options);
        let pixels = decoder
            .decode()
            .map_err(|e| Error::codec(format!("jpeg decode failed: {e:?}")))?;
        let (w, h) = decoder
            .dimensions()
            .ok_or_else(|| Error::codec("jpeg decoded without dimensions"))?;

        if w != self.width as usize || h != self.height as usize {
            return Err(Error::codec(format!(
                "jpeg is {w}x{h}, expected {}x{}",
                self.width, self.height
            )));
        }

        let (y, u, v) = out.planes_mut();
        if pixels.len() == w * h {
            // greyscale source
            y.copy_from_slice(&pixels);
            u.fill(128);
            v.fill(128);
            return Ok(());
        }
        if pixels.len() != w * h * 3 {
            return Err(Error::codec(format!(
                "jpeg produced {} bytes for {w}x{h}",
                pixels.len()
            )));
        }

        for (dst, px) in y.iter_mut().zip(pixels.chunks_exact(3)) {
            *dst = px[0];
        }
        ycbcr444_chroma_to_420(&pixels, w, u, v);
        Ok(())
    }
}

/// 2x2 box-average the interleaved Cb/Cr of a 4:4:4 image.
fn ycbcr444_chroma_to_420(pixels: &[u8], width: usize, u: &mut [u8], v: &mut [u8]) {
    let stride = width * 3;
    let half = width / 2;
    for (i, (cb, cr)) in u.iter_mut().zip(v.iter_mut()).enumerate() {
        let (cy, cx) = (i / half, i % half);
        let top = 2 * cy * stride + 2 * cx * 3;
        let bottom = top + stride;
        let sum = |c: usize| {
            pixels[top + c] as u16
                + pixels[top + 3 + c] as u16
                + pixels[bottom + c] as u16
                + pixels[bottom + 3 + c] as u16
        };
        *cb = ((sum(1) + 2) / 4) as u8;
        *cr = ((sum(2) + 2) / 4) as u8;
    }
}
