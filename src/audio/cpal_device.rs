//! Sound card capture and playback through cpal
//!
//! cpal delivers and requests samples on its own callback thread. Each
//! endpoint bridges that callback to the pipeline's blocking calls with a
//! lock-free SPSC byte ring. The `cpal::Stream` itself is not `Send`, so it
//! is built and kept alive on a small host thread owned by the endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, info, warn};

use super::{AudioFormat, AudioSink, AudioSource, SAMPLE_BYTES};
use crate::error::{Error, Result};

/// How long a blocked read/write sleeps before polling the ring again.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Stream failure reported from the cpal error callback.
type StreamFault = Arc<Mutex<Option<String>>>;

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

fn find_device(host: &cpal::Host, name: &str, direction: Direction) -> Result<cpal::Device> {
    let device = match (name.is_empty(), direction) {
        (true, Direction::Input) => host.default_input_device(),
        (true, Direction::Output) => host.default_output_device(),
        (false, Direction::Input) => host
            .input_devices()
            .map_err(|e| Error::config(format!("enumerating input devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
        (false, Direction::Output) => host
            .output_devices()
            .map_err(|e| Error::config(format!("enumerating output devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
    };
    device.ok_or_else(|| {
        let name = if name.is_empty() { "default" } else { name };
        Error::config(format!("audio device {name} not found"))
    })
}

fn stream_config(format: AudioFormat) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn record_fault(fault: &StreamFault, err: cpal::StreamError) {
    warn!("audio stream error: {err}");
    if let Ok(mut slot) = fault.lock() {
        slot.get_or_insert_with(|| err.to_string());
    }
}

fn check_fault(fault: &StreamFault, device: &str) -> Result<()> {
    let slot = fault.lock().map_err(|_| Error::Poisoned("audio fault"))?;
    match slot.as_ref() {
        Some(reason) => Err(Error::device(device, reason)),
        None => Ok(()),
    }
}

/// Thread owning a playing `cpal::Stream`. Dropping it stops the stream.
struct StreamHost {
    stop: Option<flume::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHost {
    /// Run `build` on a fresh thread and keep what it returns alive there.
    /// Returns once `build` has succeeded or failed.
    fn spawn<T, F>(name: &str, build: F) -> Result<Self>
    where
        T: 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (ready_tx, ready_rx) = flume::bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // parks until the owner drops its sender
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| Error::config(format!("spawning {name}: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::config(format!("{name} exited before starting")))??;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

fn start(stream: cpal::Stream) -> Result<cpal::Stream> {
    stream
        .play()
        .map_err(|e| Error::config(format!("starting audio stream: {e}")))?;
    Ok(stream)
}

impl Drop for StreamHost {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Microphone or line-in capture.
pub struct CpalCapture {
    device: String,
    consumer: HeapCons<u8>,
    fault: StreamFault,
    overruns: Arc<AtomicU64>,
    reported_overruns: u64,
    _host: StreamHost,
}

impl CpalCapture {
    /// Open `name` (empty for the system default) for S16LE capture.
    /// `buffer_len` bytes of audio are held between the callback and `read`.
    pub fn open(name: &str, format: AudioFormat, buffer_len: usize) -> Result<Self> {
        let (mut producer, consumer) = HeapRb::<u8>::new(buffer_len.max(1)).split();
        let fault = StreamFault::default();
        let overruns = Arc::new(AtomicU64::new(0));

        let host = {
            let name = name.to_owned();
            let fault = Arc::clone(&fault);
            let overruns = Arc::clone(&overruns);
            StreamHost::spawn("audio-in-stream", move || {
                let device = find_device(&cpal::default_host(), &name, Direction::Input)?;
                info!(device = %device.name().unwrap_or_default(), ?format, "opening audio capture");
                device
                    .build_input_stream(
                        &stream_config(format),
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            if producer.vacant_len() < data.len() * SAMPLE_BYTES {
                                overruns.fetch_add(1, Ordering::Relaxed);
                                return;
                            }
                            for sample in data {
                                producer.push_slice(&sample.to_le_bytes());
                            }
                        },
                        move |err| record_fault(&fault, err),
                        None,
                    )
                    .map_err(|e| Error::config(format!("building capture stream: {e}")))
                    .and_then(start)
            })?
        };

        Ok(Self {
            device: if name.is_empty() { "default input".into() } else { name.into() },
            consumer,
            fault,
            overruns,
            reported_overruns: 0,
            _host: host,
        })
    }
}

impl AudioSource for CpalCapture {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.consumer.pop_slice(&mut buf[filled..]);
            if filled < buf.len() {
                check_fault(&self.fault, &self.device)?;
                thread::sleep(POLL_INTERVAL);
            }
        }

        let overruns = self.overruns.load(Ordering::Relaxed);
        if overruns != self.reported_overruns {
            debug!(
                dropped_callbacks = overruns - self.reported_overruns,
                "capture ring overran"
            );
            self.reported_overruns = overruns;
        }
        Ok(())
    }
}

/// Speaker or line-out playback.
pub struct CpalPlayback {
    device: String,
    producer: HeapProd<u8>,
    fault: StreamFault,
    _host: StreamHost,
}

impl CpalPlayback {
    /// Open `name` (empty for the system default) for S16LE playback.
    /// `write` blocks while `buffer_len` bytes are queued ahead of the card.
    pub fn open(name: &str, format: AudioFormat, buffer_len: usize) -> Result<Self> {
        let (producer, mut consumer) = HeapRb::<u8>::new(buffer_len.max(1)).split();
        let fault = StreamFault::default();

        let host = {
            let name = name.to_owned();
            let fault = Arc::clone(&fault);
            StreamHost::spawn("audio-out-stream", move || {
                let device = find_device(&cpal::default_host(), &name, Direction::Output)?;
                info!(device = %device.name().unwrap_or_default(), ?format, "opening audio playback");
                device
                    .build_output_stream(
                        &stream_config(format),
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            let ready = consumer.occupied_len() / SAMPLE_BYTES;
                            let mut bytes = [0u8; SAMPLE_BYTES];
                            for (i, sample) in data.iter_mut().enumerate() {
                                *sample = if i < ready && consumer.pop_slice(&mut bytes) == SAMPLE_BYTES {
                                    i16::from_le_bytes(bytes)
                                } else {
                                    0
                                };
                            }
                        },
                        move |err| record_fault(&fault, err),
                        None,
                    )
                    .map_err(|e| Error::config(format!("building playback stream: {e}")))
                    .and_then(start)
            })?
        };

        Ok(Self {
            device: if name.is_empty() { "default output".into() } else { name.into() },
            producer,
            fault,
            _host: host,
        })
    }
}

impl AudioSink for CpalPlayback {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            written += self.producer.push_slice(&buf[written..]);
            if written < buf.len() {
                check_fault(&self.fault, &self.device)?;
                thread::sleep(POLL_INTERVAL);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Reports on a channel when it is dropped, and from which thread.
    struct DropSignal(flume::Sender<Option<String>>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            let _ = self.0.send(thread::current().name().map(str::to_owned));
        }
    }

    #[test]
    fn host_keeps_the_resource_alive_until_dropped() {
        let (dropped_tx, dropped_rx) = flume::bounded(1);
        let host = StreamHost::spawn("test-stream", move || Ok(DropSignal(dropped_tx))).unwrap();

        assert!(dropped_rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(host);
        assert_eq!(dropped_rx.try_recv().unwrap().as_deref(), Some("test-stream"));
    }

    #[test]
    fn build_failure_is_returned_to_the_owner() {
        let result = StreamHost::spawn("failing-stream", || -> Result<()> {
            Err(Error::config("no such device"))
        });
        assert!(matches!(result, Err(Error::Configuration(reason)) if reason == "no such device"));
    }
}
