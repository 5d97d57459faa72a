//! Two-counter barrier keeping audio and video playback within one tick

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a playback thread waits for the other stream to catch up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitPolicy {
    /// Busy-wait. Burns a core but wakes with no scheduler latency, which
    /// matters more than CPU at tick intervals of a few milliseconds.
    #[default]
    Spin,
    /// Block on a condition variable, re-checking the counters on wakeup.
    Park,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Video,
    Audio,
}

impl Stream {
    fn other(self) -> Stream {
        match self {
            Stream::Video => Stream::Audio,
            Stream::Audio => Stream::Video,
        }
    }
}

/// Monotonic per-stream tick counters plus the wait protocol.
///
/// Each playback thread calls [`tick`](SyncController::tick) right after
/// taking a tick off its queue and before the slow degrade/render/emit work.
/// `tick` bumps the caller's counter and then waits until it is no longer
/// ahead of the other stream. A stream can therefore lead by at most one
/// tick, and only while it is the one waiting.
pub struct SyncController {
    video: CachePadded<AtomicU64>,
    audio: CachePadded<AtomicU64>,
    policy: WaitPolicy,
    parked: Mutex<()>,
    advanced: Condvar,
}

impl SyncController {
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            video: CachePadded::new(AtomicU64::new(0)),
            audio: CachePadded::new(AtomicU64::new(0)),
            policy,
            parked: Mutex::new(()),
            advanced: Condvar::new(),
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub fn count(&self, stream: Stream) -> u64 {
        self.counter(stream).load(Ordering::Acquire)
    }

    /// `(video, audio)` counters.
    pub fn counts(&self) -> (u64, u64) {
        (self.count(Stream::Video), self.count(Stream::Audio))
    }

    /// Record one consumed tick for `stream` and wait until the other stream
    /// has consumed at least as many.
    pub fn tick(&self, stream: Stream) -> Result<u64> {
        let own = self.counter(stream).fetch_add(1, Ordering::AcqRel) + 1;
        let other = self.counter(stream.other());

        match self.policy {
            WaitPolicy::Spin => {
                while other.load(Ordering::Acquire) < own {
                    std::hint::spin_loop();
                }
            }
            WaitPolicy::Park => {
                let parked = self.parked.lock().map_err(|_| Error::Poisoned("sync"))?;
                self.advanced.notify_all();
                let _parked = self
                    .advanced
                    .wait_while(parked, |_| other.load(Ordering::Acquire) < own)
                    .map_err(|_| Error::Poisoned("sync"))?;
            }
        }
        Ok(own)
    }

    fn counter(&self, stream: Stream) -> &AtomicU64 {
        match stream {
            Stream::Video => &self.video,
            Stream::Audio => &self.audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn lone_tick_waits_for_the_other_stream() {
        let sync = Arc::new(SyncController::new(WaitPolicy::Park));
        let video = {
            let sync = Arc::clone(&sync);
            thread::spawn(move || sync.tick(Stream::Video).unwrap())
        };

        while sync.count(Stream::Video) == 0 {
            thread::yield_now();
        }
        assert!(!video.is_finished());
        assert_eq!(sync.tick(Stream::Audio).unwrap(), 1);
        assert_eq!(video.join().unwrap(), 1);
    }

    #[test]
    fn counters_never_drift_more_than_one_tick() {
        for policy in [WaitPolicy::Spin, WaitPolicy::Park] {
            let sync = Arc::new(SyncController::new(policy));
            let workers: Vec<_> = [Stream::Video, Stream::Audio]
                .into_iter()
                .map(|stream| {
                    let sync = Arc::clone(&sync);
                    thread::spawn(move || {
                        for _ in 0..500 {
                            sync.tick(stream).unwrap();
                            // our own counter is stable here, so this pair is a snapshot
                            let (v, a) = sync.counts();
                            assert!(v.abs_diff(a) <= 1, "v={v} a={a}");
                        }
                    })
                })
                .collect();

            let observer = {
                let sync = Arc::clone(&sync);
                thread::spawn(move || loop {
                    let audio = sync.count(Stream::Audio);
                    let video = sync.count(Stream::Video);
                    let audio_after = sync.count(Stream::Audio);
                    if audio == audio_after {
                        assert!(video.abs_diff(audio) <= 1, "v={video} a={audio}");
                    }
                    if video == 500 && audio == 500 {
                        break;
                    }
                })
            };

            for worker in workers {
                worker.join().unwrap();
            }
            observer.join().unwrap();
            assert_eq!(sync.counts(), (500, 500));
        }
    }
}
