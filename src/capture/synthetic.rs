//! Camera stand-in: a scrolling colour-bar pattern in any capture format

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use super::frame::{Frame, PixelFormat};
use super::VideoSource;
use crate::error::{Error, Result};
use crate::pipeline::pacer::Pacer;

/// White, yellow, cyan, green, magenta, red, blue, black.
const BARS_RGB: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

const JPEG_QUALITY: u8 = 90;

/// Full-range BT.601 as used by JFIF.
fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    [y, cb, cr].map(|c| c.round().clamp(0.0, 255.0) as u8)
}

/// Emits a pattern that moves a few pixels per frame, packed in the
/// configured format. Paced at the configured frame rate unless built with
/// [`unpaced`](SyntheticCapture::unpaced).
pub struct SyntheticCapture {
    format: PixelFormat,
    canonical: Frame,
    raw: Vec<u8>,
    rgb: Vec<u8>,
    /// Bar index per column for the current tick.
    bars: Vec<usize>,
    pacer: Option<Pacer>,
    tick: u64,
}

impl SyntheticCapture {
    pub fn new(format: PixelFormat, width: u32, height: u32, fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(Error::config("synthetic capture needs a non-zero frame rate"));
        }
        Ok(Self {
            format,
            canonical: Frame::new(width, height)?,
            raw: Vec::new(),
            rgb: Vec::new(),
            bars: Vec::new(),
            pacer: Some(Pacer::from_fps(fps)),
            tick: 0,
        })
    }

    /// Produce frames as fast as they are asked for.
    pub fn unpaced(mut self) -> Self {
        self.pacer = None;
        self
    }

    fn render(&mut self) {
        let width = self.canonical.width() as usize;
        let shift = (self.tick as usize * 4) % width;
        self.bars.clear();
        self.bars
            .extend((0..width).map(|x| (x + shift) % width * BARS_RGB.len() / width));

        let bars = &self.bars;
        let ycbcr = BARS_RGB.map(rgb_to_ycbcr);

        let chroma_width = self.canonical.chroma_width() as usize;
        let (y, u, v) = self.canonical.planes_mut();
        for row in y.chunks_exact_mut(width) {
            for (px, &bar) in row.iter_mut().zip(bars) {
                *px = ycbcr[bar][0];
            }
        }
        let chroma_rows = u
            .chunks_exact_mut(chroma_width)
            .zip(v.chunks_exact_mut(chroma_width));
        for (u_row, v_row) in chroma_rows {
            for cx in 0..chroma_width {
                let bar = bars[cx * 2];
                u_row[cx] = ycbcr[bar][1];
                v_row[cx] = ycbcr[bar][2];
            }
        }
    }

    fn pack(&mut self) -> Result<()> {
        let frame = &self.canonical;
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let chroma_width = frame.chroma_width() as usize;
        self.raw.clear();

        match self.format {
            PixelFormat::I420 => {
                self.raw.extend_from_slice(frame.y());
                self.raw.extend_from_slice(frame.u());
                self.raw.extend_from_slice(frame.v());
            }
            PixelFormat::Nv12 => {
                self.raw.extend_from_slice(frame.y());
                for (&u, &v) in frame.u().iter().zip(frame.v()) {
                    self.raw.extend_from_slice(&[u, v]);
                }
            }
            PixelFormat::Yuyv => {
                for row in 0..height {
                    let luma = &frame.y()[row * width..][..width];
                    let chroma_row = (row / 2) * chroma_width;
                    for (cx, pair) in luma.chunks_exact(2).enumerate() {
                        let u = frame.u()[chroma_row + cx];
                        let v = frame.v()[chroma_row + cx];
                        self.raw.extend_from_slice(&[pair[0], u, pair[1], v]);
                    }
                }
            }
            PixelFormat::Mjpeg => {
                self.rgb.clear();
                for _ in 0..height {
                    for &bar in &self.bars {
                        self.rgb.extend_from_slice(&BARS_RGB[bar]);
                    }
                }
                JpegEncoder::new_with_quality(&mut self.raw, JPEG_QUALITY)
                    .encode(&self.rgb, width as u32, height as u32, ExtendedColorType::Rgb8)
                    .map_err(|e| Error::device("synthetic", e))?;
            }
        }
        Ok(())
    }
}

impl VideoSource for SyntheticCapture {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn next_frame(&mut self) -> Result<&[u8]> {
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }
        self.render();
        self.pack()?;
        self.tick += 1;
        Ok(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::normalize::Normalizer;
    use crate::codec::Outcome;

    #[test]
    fn raw_formats_normalize_back_to_the_pattern() {
        for format in [PixelFormat::I420, PixelFormat::Nv12, PixelFormat::Yuyv] {
            let mut source = SyntheticCapture::new(format, 32, 16, 30).unwrap().unpaced();
            let raw = source.next_frame().unwrap().to_vec();
            assert_eq!(Some(raw.len()), format.frame_len(32, 16));

            let mut out = Frame::new(32, 16).unwrap();
            let mut normalizer = Normalizer::new(format, 32, 16).unwrap();
            assert_eq!(normalizer.normalize(&raw, &mut out).unwrap(), Outcome::Decoded);
            assert_eq!(out, source.canonical, "{format:?}");
        }
    }

    #[test]
    fn mjpeg_output_is_a_decodable_image() {
        let mut source = SyntheticCapture::new(PixelFormat::Mjpeg, 32, 16, 30)
            .unwrap()
            .unpaced();
        let raw = source.next_frame().unwrap().to_vec();
        assert_eq!(&raw[..2], &[0xFF, 0xD8]);

        let mut out = Frame::new(32, 16).unwrap();
        let mut normalizer = Normalizer::new(PixelFormat::Mjpeg, 32, 16).unwrap();
        assert_eq!(normalizer.normalize(&raw, &mut out).unwrap(), Outcome::Decoded);
        // first column is the white bar on the first tick
        assert!(out.y()[0] > 200, "luma {}", out.y()[0]);
    }

    #[test]
    fn pattern_moves_between_frames() {
        let mut source = SyntheticCapture::new(PixelFormat::I420, 64, 8, 30)
            .unwrap()
            .unpaced();
        let first = source.next_frame().unwrap().to_vec();
        let second = source.next_frame().unwrap().to_vec();
        assert_ne!(first, second);
    }
}
