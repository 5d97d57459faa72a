//! Wall-clock frame pacing for devices that are not clocked to the target rate

use std::time::{Duration, Instant};

use tracing::debug;

/// Fixed-interval schedule: `next_due += interval`, sleep until due.
///
/// Missed deadlines are not skipped; a late caller runs back-to-back until it
/// has caught up with the schedule.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn from_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs(1) / fps.max(1))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next slot of the schedule. The first call returns
    /// immediately and anchors the schedule.
    pub fn wait(&mut self) {
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if due > now {
            std::thread::sleep(due - now);
        } else if now - due > self.interval {
            debug!(behind_us = (now - due).as_micros() as u64, "pacer running late");
        }
        self.next_due = Some(due + self.interval);
    }
}
