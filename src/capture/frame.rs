use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Luma value of the placeholder frame.
pub const PLACEHOLDER_LUMA: u8 = 255;
/// Chroma value of the placeholder frame (neutral grey axis).
pub const PLACEHOLDER_CHROMA: u8 = 128;

/// Canonical planar 4:2:0 frame: luma at `width x height`, both chroma
/// planes at `width/2 x height/2`. Geometry is fixed at construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl Frame {
    /// Allocate a black frame. Width and height must be even and non-zero.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::solid(width, height, 0, PLACEHOLDER_CHROMA, PLACEHOLDER_CHROMA)
    }

    /// Allocate a frame with every plane filled with a single value.
    pub fn solid(width: u32, height: u32, y: u8, u: u8, v: u8) -> Result<Self> {
        check_geometry(width, height)?;
        let luma = width as usize * height as usize;
        Ok(Self {
            width,
            height,
            y: vec![y; luma],
            u: vec![u; luma / 4],
            v: vec![v; luma / 4],
        })
    }

    /// The "no output available yet" frame: white luma, neutral chroma.
    pub fn placeholder(width: u32, height: u32) -> Result<Self> {
        Self::solid(
            width,
            height,
            PLACEHOLDER_LUMA,
            PLACEHOLDER_CHROMA,
            PLACEHOLDER_CHROMA,
        )
    }

    /// Overwrite in place with the placeholder pattern.
    pub fn fill_placeholder(&mut self) {
        self.y.fill(PLACEHOLDER_LUMA);
        self.u.fill(PLACEHOLDER_CHROMA);
        self.v.fill(PLACEHOLDER_CHROMA);
    }

    pub fn is_placeholder(&self) -> bool {
        self.y.iter().all(|&b| b == PLACEHOLDER_LUMA)
            && self.u.iter().all(|&b| b == PLACEHOLDER_CHROMA)
            && self.v.iter().all(|&b| b == PLACEHOLDER_CHROMA)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chroma_width(&self) -> u32 {
        self.width / 2
    }

    pub fn chroma_height(&self) -> u32 {
        self.height / 2
    }

    pub fn same_geometry(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    pub fn u(&self) -> &[u8] {
        &self.u
    }

    pub fn v(&self) -> &[u8] {
        &self.v
    }

    /// Mutable access to all three planes at once.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        (&mut self.y, &mut self.u, &mut self.v)
    }

    /// Total byte size of the three planes.
    pub fn byte_len(&self) -> usize {
        self.y.len() + self.u.len() + self.v.len()
    }

    /// Copy the pixels of another frame of identical geometry.
    pub fn copy_from(&mut self, other: &Frame) {
        debug_assert!(self.same_geometry(other));
        self.y.copy_from_slice(&other.y);
        self.u.copy_from_slice(&other.u);
        self.v.copy_from_slice(&other.v);
    }

    /// Copy stride-padded planes (as handed out by a decoder) into this frame.
    pub fn copy_from_strided(
        &mut self,
        planes: (&[u8], &[u8], &[u8]),
        strides: (usize, usize, usize),
    ) -> Result<()> {
        let (w, h) = (self.width as usize, self.height as usize);
        copy_plane(&mut self.y, planes.0, strides.0, w, h)?;
        copy_plane(&mut self.u, planes.1, strides.1, w / 2, h / 2)?;
        copy_plane(&mut self.v, planes.2, strides.2, w / 2, h / 2)?;
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn copy_plane(dst: &mut [u8], src: &[u8], stride: usize, width: usize, height: usize) -> Result<()> {
    if stride < width || src.len() < stride * (height - 1) + width {
        return Err(Error::codec(format!(
            "decoded plane too small: {} bytes at stride {stride} for {width}x{height}",
            src.len()
        )));
    }
    for (row, out) in dst.chunks_exact_mut(width).enumerate() {
        out.copy_from_slice(&src[row * stride..row * stride + width]);
    }
    Ok(())
}

fn check_geometry(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(Error::config(format!(
            "frame geometry {width}x{height} must be non-zero and even"
        )));
    }
    Ok(())
}

/// Capture pixel formats the normalizer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 4:2:2, `Y0 U Y1 V`.
    #[serde(rename = "YUYV")]
    Yuyv,
    /// Planar 4:2:0, already canonical.
    #[serde(rename = "YU12")]
    I420,
    /// Semi-planar 4:2:0 with interleaved `U V` chroma.
    #[serde(rename = "NV12")]
    Nv12,
    /// Motion-JPEG, one compressed image per frame.
    #[serde(rename = "MJPEG")]
    Mjpeg,
}

/// Every format accepted at open time.
pub const SUPPORTED_FORMATS: [PixelFormat; 4] = [
    PixelFormat::Nv12,
    PixelFormat::Yuyv,
    PixelFormat::I420,
    PixelFormat::Mjpeg,
];

impl PixelFormat {
    /// V4L2 fourcc code.
    pub const fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::I420 => *b"YU12",
            PixelFormat::Nv12 => *b"NV12",
            PixelFormat::Mjpeg => *b"MJPG",
        }
    }

    pub fn from_fourcc(code: [u8; 4]) -> Option<Self> {
        SUPPORTED_FORMATS.into_iter().find(|f| f.fourcc() == code)
    }

    /// Parse the operator-facing name (`"YUYV"`, `"YU12"`, `"NV12"`, `"MJPEG"`).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "YUYV" => Ok(PixelFormat::Yuyv),
            "YU12" | "I420" => Ok(PixelFormat::I420),
            "NV12" => Ok(PixelFormat::Nv12),
            "MJPEG" | "MJPG" => Ok(PixelFormat::Mjpeg),
            other => Err(Error::config(format!("pixel format {other} is not implemented"))),
        }
    }

    /// Bytes one raw frame occupies, `None` for compressed formats.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Yuyv => Some(pixels * 2),
            PixelFormat::I420 | PixelFormat::Nv12 => Some(pixels * 3 / 2),
            PixelFormat::Mjpeg => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_sizes_follow_geometry() {
        for (w, h) in [(2, 2), (64, 64), (640, 480), (1280, 720), (34, 18)] {
            let frame = Frame::new(w, h).unwrap();
            let luma = (w * h) as usize;
            assert_eq!(frame.y().len(), luma);
            assert_eq!(frame.u().len(), luma / 4);
            assert_eq!(frame.v().len(), luma / 4);
            assert_eq!(frame.byte_len(), luma * 3 / 2);
        }
    }

    #[test]
    fn odd_or_empty_geometry_is_rejected() {
        assert!(matches!(Frame::new(63, 64), Err(Error::Configuration(_))));
        assert!(matches!(Frame::new(64, 0), Err(Error::Configuration(_))));
    }

    #[test]
    fn placeholder_is_white_with_neutral_chroma() {
        let mut frame = Frame::solid(8, 8, 10, 20, 30).unwrap();
        assert!(!frame.is_placeholder());
        frame.fill_placeholder();
        assert!(frame.is_placeholder());
        assert_eq!(frame, Frame::placeholder(8, 8).unwrap());
    }

    #[test]
    fn strided_copy_drops_padding() {
        let mut frame = Frame::new(4, 2).unwrap();
        let y = [1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0];
        let u = [9, 10, 0];
        let v = [11, 12, 0];
        frame.copy_from_strided((&y, &u, &v), (6, 3, 3)).unwrap();
        assert_eq!(frame.y(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frame.u(), &[9, 10]);
        assert_eq!(frame.v(), &[11, 12]);
    }

    #[test]
    fn format_names_and_fourcc_agree() {
        for format in SUPPORTED_FORMATS {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_name("mjpeg").unwrap(), PixelFormat::Mjpeg);
        assert!(PixelFormat::from_name("RGB3").is_err());
    }
}
