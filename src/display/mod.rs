#[cfg(feature = "sdl-display")]
pub mod display;

#[cfg(feature = "sdl-display")]
pub use display::Sdl2Display;

use crate::capture::frame::Frame;
use crate::error::Result;

/// Where played-back video ends up.
///
/// Not required to be `Send`: the sink is driven from the thread that
/// created it.
pub trait RenderSink {
    /// Show one frame. Expected to be fast relative to a tick.
    fn draw(&mut self, frame: &Frame) -> Result<()>;
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn draw(&mut self, frame: &Frame) -> Result<()> {
        (**self).draw(frame)
    }
}

/// Discards frames, counting them. Used for headless runs.
#[derive(Debug, Default)]
pub struct NullDisplay {
    frames: u64,
}

impl NullDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderSink for NullDisplay {
    fn draw(&mut self, _frame: &Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}
