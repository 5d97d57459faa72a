//! YUV4MPEG2 dumps of canonical frames

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::capture::frame::Frame;
use crate::error::{Error, Result};

pub const FRAME_MARKER: &[u8] = b"FRAME\n";

/// Type-erased dump target used by the pipeline.
pub type ArchiveSink = Y4mWriter<Box<dyn Write + Send>>;

/// Writes one header, then a `FRAME` record of raw planes per frame.
///
/// The header goes out as soon as the writer is created, so every dump is a
/// valid stream even if no record follows. Frames must match its geometry.
pub struct Y4mWriter<W: Write> {
    out: W,
    width: u32,
    height: u32,
    frames: u64,
    skip: u64,
}

impl ArchiveSink {
    /// Create (or truncate) `path` and dump into it through a buffer.
    pub fn create(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        let file = File::create(path)?;
        info!(path = %path.display(), width, height, fps, "archiving frames");
        Self::new(Box::new(BufWriter::new(file)), width, height, fps)
    }
}

impl<W: Write> Y4mWriter<W> {
    pub fn new(mut out: W, width: u32, height: u32, fps: u32) -> Result<Self> {
        writeln!(out, "YUV4MPEG2 W{width} H{height} F{fps}:1 Ip A0:0 C420jpeg")?;
        Ok(Self {
            out,
            width,
            height,
            frames: 0,
            skip: 0,
        })
    }

    /// Drop the first `count` frames offered to [`write`](Self::write).
    pub fn skip_first(mut self, count: u64) -> Self {
        self.skip = count;
        self
    }

    /// Records written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(Error::config(format!(
                "archive opened at {}x{}, got {}x{} frame",
                self.width,
                self.height,
                frame.width(),
                frame.height()
            )));
        }
        if self.skip > 0 {
            self.skip -= 1;
            return Ok(());
        }

        self.out.write_all(FRAME_MARKER)?;
        self.out.write_all(frame.y())?;
        self.out.write_all(frame.u())?;
        self.out.write_all(frame.v())?;
        self.frames += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
