//! Audio device seam: signed 16-bit little-endian interleaved PCM

#[cfg(feature = "audio-device")]
pub mod cpal_device;
pub mod synthetic;

#[cfg(feature = "audio-device")]
pub use cpal_device::{CpalCapture, CpalPlayback};
pub use synthetic::{NullSink, ToneSource};

use crate::error::Result;

/// Bytes per S16LE sample.
pub const SAMPLE_BYTES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Bytes in one sample frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * SAMPLE_BYTES
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }

    /// Bytes of audio per video tick at `fps`, rounded down to whole sample
    /// frames so a chunk never splits a sample.
    pub fn chunk_len(&self, fps: u32) -> usize {
        let frame = self.frame_bytes();
        if frame == 0 || fps == 0 {
            return 0;
        }
        self.bytes_per_second() / fps as usize / frame * frame
    }
}

/// Blocking capture device.
pub trait AudioSource: Send {
    /// Fill `buf` completely, waiting for the device as needed.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// Blocking playback device.
pub trait AudioSink: Send {
    /// Queue all of `buf` for playback, waiting for room as needed.
    fn write(&mut self, buf: &[u8]) -> Result<()>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_is_one_tick_of_whole_sample_frames() {
        let cd = AudioFormat {
            sample_rate: 44_100,
            channels: 2,
        };
        assert_eq!(cd.bytes_per_second(), 176_400);
        assert_eq!(cd.chunk_len(30), 5_880);
        // 176400 / 24 = 7350, which is not a multiple of 4
        assert_eq!(cd.chunk_len(24), 7_348);
    }

    #[test]
    fn degenerate_formats_have_empty_chunks() {
        let mono = AudioFormat {
            sample_rate: 10,
            channels: 1,
        };
        assert_eq!(mono.chunk_len(30), 0);
        assert_eq!(mono.chunk_len(0), 0);
    }
}
