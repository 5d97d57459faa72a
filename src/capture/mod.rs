pub mod frame;
pub mod normalize;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{Frame, PixelFormat};
pub use normalize::Normalizer;
pub use synthetic::SyntheticCapture;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Capture;

use crate::error::Result;

/// A video device delivering one raw frame per call in its configured
/// pixel format.
pub trait VideoSource: Send {
    fn format(&self) -> PixelFormat;

    /// Block until the next frame is available. The slice stays valid until
    /// the following call.
    fn next_frame(&mut self) -> Result<&[u8]>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn format(&self) -> PixelFormat {
        (**self).format()
    }

    fn next_frame(&mut self) -> Result<&[u8]> {
        (**self).next_frame()
    }
}
