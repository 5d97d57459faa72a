//! Audio capture and playback roles

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use metrics::counter;
use tracing::trace;

use super::ringbuf::AudioFifo;
use super::sync::{Stream, SyncController};
use crate::audio::{AudioSink, AudioSource};
use crate::error::Result;

/// One tick of S16LE audio. Its length is fixed when the FIFO is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    data: Box<[u8]>,
}

impl AudioChunk {
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0; len].into_boxed_slice(),
        }
    }
}

impl Deref for AudioChunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for AudioChunk {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Build a FIFO of `capacity` silent chunks of `chunk_len` bytes.
pub fn audio_fifo(capacity: usize, chunk_len: usize) -> Result<AudioFifo> {
    AudioFifo::new(capacity, || Ok(AudioChunk::new(chunk_len)))
}

/// Reads device audio into the FIFO one chunk at a time.
pub struct AudioCapture<S> {
    source: S,
    fifo: Arc<AudioFifo>,
}

impl<S: AudioSource> AudioCapture<S> {
    pub fn new(source: S, fifo: Arc<AudioFifo>) -> Self {
        Self { source, fifo }
    }

    /// Wait for a free chunk, fill it from the device, publish it.
    pub fn step(&mut self) -> Result<()> {
        let mut chunk = self.fifo.acquire_back()?;
        self.source.read(&mut chunk)?;
        chunk.release()
    }
}

/// Plays FIFO chunks in lock-step with video playback.
pub struct AudioPlayback<S> {
    sink: S,
    fifo: Arc<AudioFifo>,
    sync: Arc<SyncController>,
}

impl<S: AudioSink> AudioPlayback<S> {
    pub fn new(sink: S, fifo: Arc<AudioFifo>, sync: Arc<SyncController>) -> Self {
        Self { sink, fifo, sync }
    }

    /// Take the oldest chunk, count the tick, play it, retire it.
    pub fn step(&mut self) -> Result<()> {
        let chunk = self.fifo.front()?;
        let tick = self.sync.tick(Stream::Audio)?;
        self.sink.write(&chunk)?;
        chunk.pop()?;

        counter!("audio_chunks_played").increment(1);
        trace!(tick, "audio chunk played");
        Ok(())
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
