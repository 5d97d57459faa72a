//! Hardware-free audio endpoints

use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use super::{AudioFormat, AudioSink, AudioSource};
use crate::error::{Error, Result};

const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.25;

/// Sine tone on every channel, delivered at the real-time sample rate.
pub struct ToneSource {
    format: AudioFormat,
    paced: bool,
    started: Option<Instant>,
    frames_emitted: u64,
}

impl ToneSource {
    pub fn new(format: AudioFormat) -> Result<Self> {
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(Error::config(format!("unusable audio format {format:?}")));
        }
        Ok(Self {
            format,
            paced: true,
            started: None,
            frames_emitted: 0,
        })
    }

    /// Return samples immediately instead of at the sample rate.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Sleep until the sample clock has reached `frames_emitted`.
    fn wait_for_clock(&mut self) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started
            + Duration::from_secs_f64(self.frames_emitted as f64 / self.format.sample_rate as f64);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}

impl AudioSource for ToneSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let frame_bytes = self.format.frame_bytes();
        let step = TAU * TONE_HZ / self.format.sample_rate as f32;

        for frame in buf.chunks_exact_mut(frame_bytes) {
            let phase = (self.frames_emitted % self.format.sample_rate as u64) as f32 * step;
            let sample = (phase.sin() * TONE_AMPLITUDE * i16::MAX as f32) as i16;
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample.to_le_bytes());
            }
            self.frames_emitted += 1;
        }

        if self.paced {
            self.wait_for_clock();
        }
        Ok(())
    }
}

/// Discards everything written to it.
#[derive(Debug, Default)]
pub struct NullSink {
    bytes_written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl AudioSink for NullSink {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.bytes_written += buf.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> AudioFormat {
        AudioFormat {
            sample_rate: 8_000,
            channels: 2,
        }
    }

    #[test]
    fn channels_carry_the_same_sample() {
        let mut tone = ToneSource::new(stereo()).unwrap().unpaced();
        let mut buf = vec![0u8; stereo().chunk_len(25)];
        tone.read(&mut buf).unwrap();
        for frame in buf.chunks_exact(4) {
            assert_eq!(frame[..2], frame[2..]);
        }
        // a 440 Hz tone crosses zero within one 40 ms chunk
        assert!(buf.chunks_exact(4).any(|f| i16::from_le_bytes([f[0], f[1]]) > 1000));
        assert!(buf.chunks_exact(4).any(|f| i16::from_le_bytes([f[0], f[1]]) < -1000));
    }

    #[test]
    fn paced_reads_follow_the_sample_clock() {
        let mut tone = ToneSource::new(stereo()).unwrap();
        let mut buf = vec![0u8; stereo().chunk_len(50)];
        let start = Instant::now();
        for _ in 0..3 {
            tone.read(&mut buf).unwrap();
        }
        // three 20 ms chunks
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[test]
    fn zero_channels_is_rejected() {
        let format = AudioFormat {
            sample_rate: 8_000,
            channels: 0,
        };
        assert!(ToneSource::new(format).is_err());
    }
}
