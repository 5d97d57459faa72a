//! Pixel format normalization into the canonical 4:2:0 planar frame

use tracing::trace;

use super::frame::{Frame, PixelFormat};
use crate::codec::mjpeg::MjpegDecoder;
use crate::codec::Outcome;
use crate::error::{Error, Result};

/// Conversion routine for one capture format, chosen once at open time.
pub enum Normalizer {
    Yuyv,
    I420,
    Nv12,
    Mjpeg(MjpegDecoder),
}

impl Normalizer {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        Ok(match format {
            PixelFormat::Yuyv => Normalizer::Yuyv,
            PixelFormat::I420 => Normalizer::I420,
            PixelFormat::Nv12 => Normalizer::Nv12,
            PixelFormat::Mjpeg => Normalizer::Mjpeg(MjpegDecoder::new(width, height)?),
        })
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            Normalizer::Yuyv => PixelFormat::Yuyv,
            Normalizer::I420 => PixelFormat::I420,
            Normalizer::Nv12 => PixelFormat::Nv12,
            Normalizer::Mjpeg(_) => PixelFormat::Mjpeg,
        }
    }

    /// Convert one captured buffer into `out`, overwriting it in place.
    ///
    /// Raw formats always produce a frame; MJPEG may report a placeholder
    /// while its parser is still waiting for a complete image.
    pub fn normalize(&mut self, raw: &[u8], out: &mut Frame) -> Result<Outcome> {
        let (width, height) = (out.width() as usize, out.height() as usize);
        if let Some(expected) = self.format().frame_len(out.width(), out.height()) {
            if raw.len() < expected {
                return Err(Error::device(
                    "capture",
                    format!(
                        "short {:?} frame: {} bytes, expected {expected}",
                        self.format(),
                        raw.len()
                    ),
                ));
            }
        }
        trace!(format = ?self.format(), bytes = raw.len(), "normalizing frame");

        match self {
            Normalizer::Yuyv => yuyv_to_i420(raw, width, height, out),
            Normalizer::I420 => {
                let luma = width * height;
                let (y, u, v) = out.planes_mut();
                y.copy_from_slice(&raw[..luma]);
                u.copy_from_slice(&raw[luma..luma + luma / 4]);
                v.copy_from_slice(&raw[luma + luma / 4..luma + luma / 2]);
            }
            Normalizer::Nv12 => {
                let luma = width * height;
                let (y, u, v) = out.planes_mut();
                y.copy_from_slice(&raw[..luma]);
                let chroma = &raw[luma..luma + luma / 2];
                for ((pair, cb), cr) in chroma.chunks_exact(2).zip(u.iter_mut()).zip(v.iter_mut()) {
                    *cb = pair[0];
                    *cr = pair[1];
                }
            }
            Normalizer::Mjpeg(decoder) => return decoder.decode(raw, out),
        }
        Ok(Outcome::Decoded)
    }
}

/// Packed 4:2:2 to planar 4:2:0. Chroma of each row pair is averaged.
fn yuyv_to_i420(raw: &[u8], width: usize, height: usize, out: &mut Frame) {
    let stride = width * 2;
    let (y, u, v) = out.planes_mut();

    for (row, luma) in y.chunks_exact_mut(width).enumerate() {
        let src = &raw[row * stride..(row + 1) * stride];
        for (px, dst) in luma.chunks_exact_mut(2).enumerate() {
            dst[0] = src[px * 4];
            dst[1] = src[px * 4 + 2];
        }
    }

    for (crow, (cb, cr)) in u
        .chunks_exact_mut(width / 2)
        .zip(v.chunks_exact_mut(width / 2))
        .enumerate()
    {
        let top = &raw[2 * crow * stride..(2 * crow + 1) * stride];
        let bottom = &raw[(2 * crow + 1) * stride..(2 * crow + 2) * stride];
        for (px, (b, r)) in cb.iter_mut().zip(cr.iter_mut()).enumerate() {
            *b = avg(top[px * 4 + 1], bottom[px * 4 + 1]);
            *r = avg(top[px * 4 + 3], bottom[px * 4 + 3]);
        }
    }
}

#[inline]
fn avg(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16 + 1) / 2) as u8
}
