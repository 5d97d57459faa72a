//! Bounded single-producer/single-consumer slot ring for the delay buffer

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

use crossbeam::utils::CachePadded;

use crate::capture::frame::Frame;
use crate::error::{Error, Result};
use crate::pipeline::audio::AudioChunk;

/// Delay buffer between video capture and playback.
pub type FrameRing = SlotRing<Frame>;
/// Delay buffer between audio capture and playback.
pub type AudioFifo = SlotRing<AudioChunk>;

/// Fixed-capacity ring of preallocated slots, filled in place.
///
/// Exactly one thread acquires back slots and exactly one consumes front
/// slots. Cursor bookkeeping sits under one mutex shared by both ends and a
/// condition variable wakes the other end whenever occupancy changes.
pub struct SlotRing<T> {
    slots: Box<[Mutex<T>]>,
    cursors: Mutex<Cursors>,
    changed: Condvar,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Debug, Default)]
struct Cursors {
    front_idx: usize,
    back_idx: usize,
    occupancy: usize,
}

#[derive(Default)]
struct Stats {
    slots_written: AtomicUsize,
    slots_read: AtomicUsize,
}

impl<T> SlotRing<T> {
    /// Allocate `capacity` slots up front with `init`. Nothing is ever
    /// reallocated afterwards.
    pub fn new(capacity: usize, mut init: impl FnMut() -> Result<T>) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("ring capacity must be at least 1"));
        }
        let slots = (0..capacity)
            .map(|_| init().map(Mutex::new))
            .collect::<Result<Vec<_>>>()?
            .into_boxed_slice();

        Ok(Self {
            slots,
            cursors: Mutex::new(Cursors::default()),
            changed: Condvar::new(),
            stats: CachePadded::new(Stats::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Populated slots not yet consumed.
    pub fn occupancy(&self) -> Result<usize> {
        Ok(self.lock_cursors()?.occupancy)
    }

    /// Producer: wait for a free slot and hand it out for writing.
    ///
    /// The slot becomes visible to the consumer only once
    /// [`BackSlot::release`] is called.
    pub fn acquire_back(&self) -> Result<BackSlot<'_, T>> {
        let mut cursors = self.lock_cursors()?;
        while cursors.occupancy == self.capacity() {
            cursors = self
                .changed
                .wait(cursors)
                .map_err(|_| Error::Poisoned("ring cursors"))?;
        }
        let index = cursors.back_idx;
        drop(cursors);
        self.back_slot(index)
    }

    /// Producer, non-blocking: fails with [`Error::QueueFull`] when every slot
    /// is occupied.
    pub fn try_acquire_back(&self) -> Result<BackSlot<'_, T>> {
        let cursors = self.lock_cursors()?;
        if cursors.occupancy == self.capacity() {
            return Err(Error::QueueFull {
                capacity: self.capacity(),
            });
        }
        let index = cursors.back_idx;
        drop(cursors);
        self.back_slot(index)
    }

    /// Consumer: wait for the oldest populated slot without removing it.
    pub fn front(&self) -> Result<FrontSlot<'_, T>> {
        let mut cursors = self.lock_cursors()?;
        while cursors.occupancy == 0 {
            cursors = self
                .changed
                .wait(cursors)
                .map_err(|_| Error::Poisoned("ring cursors"))?;
        }
        let index = cursors.front_idx;
        drop(cursors);
        self.front_slot(index)
    }

    /// Consumer, non-blocking: fails with [`Error::QueueEmpty`] when nothing
    /// is populated.
    pub fn try_front(&self) -> Result<FrontSlot<'_, T>> {
        let cursors = self.lock_cursors()?;
        if cursors.occupancy == 0 {
            return Err(Error::QueueEmpty);
        }
        let index = cursors.front_idx;
        drop(cursors);
        self.front_slot(index)
    }

    /// Consumer: retire the oldest populated slot.
    pub fn pop_front(&self) -> Result<()> {
        let mut cursors = self.lock_cursors()?;
        if cursors.occupancy == 0 {
            return Err(Error::QueueEmpty);
        }
        cursors.front_idx = (cursors.front_idx + 1) % self.capacity();
        cursors.occupancy -= 1;
        drop(cursors);

        self.stats.slots_read.fetch_add(1, Ordering::Relaxed);
        self.changed.notify_all();
        Ok(())
    }

    /// `(slots written, slots read)` since start-up.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.stats.slots_written.load(Ordering::Relaxed),
            self.stats.slots_read.load(Ordering::Relaxed),
        )
    }

    fn publish_back(&self) -> Result<()> {
        let mut cursors = self.lock_cursors()?;
        if cursors.occupancy == self.capacity() {
            return Err(Error::QueueFull {
                capacity: self.capacity(),
            });
        }
        cursors.back_idx = (cursors.back_idx + 1) % self.capacity();
        cursors.occupancy += 1;
        drop(cursors);

        self.stats.slots_written.fetch_add(1, Ordering::Relaxed);
        self.changed.notify_all();
        Ok(())
    }

    fn back_slot(&self, index: usize) -> Result<BackSlot<'_, T>> {
        let guard = self.slots[index]
            .lock()
            .map_err(|_| Error::Poisoned("ring slot"))?;
        Ok(BackSlot { ring: self, guard })
    }

    fn front_slot(&self, index: usize) -> Result<FrontSlot<'_, T>> {
        let guard = self.slots[index]
            .lock()
            .map_err(|_| Error::Poisoned("ring slot"))?;
        Ok(FrontSlot { ring: self, guard })
    }

    fn lock_cursors(&self) -> Result<MutexGuard<'_, Cursors>> {
        self.cursors.lock().map_err(|_| Error::Poisoned("ring cursors"))
    }
}

/// Exclusive write access to the next free slot.
///
/// Dropping it without [`release`](BackSlot::release) abandons the write:
/// the slot is not published and will be handed out again.
pub struct BackSlot<'a, T> {
    ring: &'a SlotRing<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> BackSlot<'_, T> {
    /// Publish the written slot to the consumer.
    pub fn release(self) -> Result<()> {
        let ring = self.ring;
        drop(self.guard);
        ring.publish_back()
    }
}

impl<T> Deref for BackSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for BackSlot<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Access to the oldest populated slot. Dropping it leaves the slot in place.
pub struct FrontSlot<'a, T> {
    ring: &'a SlotRing<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> FrontSlot<'_, T> {
    /// Retire the slot, making room for the producer.
    pub fn pop(self) -> Result<()> {
        let ring = self.ring;
        drop(self.guard);
        ring.pop_front()
    }
}

impl<T> Deref for FrontSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for FrontSlot<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
