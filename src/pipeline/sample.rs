//! Media samples and their lock protocol
//!
//! A [`Sample`] wraps one backing buffer that producer and consumer share
//! without copying. Access is arbitrated by a small lock state machine
//! (`available`, `read_lock`, `write_lock`) guarded by a mutex and condition
//! variable. [`SampleView`] is the scoped handle: constructing it blocks until
//! the requested mode is obtainable, dropping it always releases.
//!
//! Three modes exist:
//! - [`LockMode::Exclusive`]: a single holder with read and write access
//!   (`lock_sample` / `unlock_sample`).
//! - [`LockMode::Read`]: shared read access, any number of holders, excluded
//!   only by writers (`read_lock_sample` / `unlock_read_lock_sample`).
//! - [`LockMode::ReadWrite`]: a producer that writes in place and then hands
//!   the same buffer to readers with [`SampleView::downgrade`], without a
//!   window in which another writer could grab it
//!   (`read_write_lock_sample` / `unlock_write_lock_sample`).
//!
//! Views must never be held across an asynchronous boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use super::types::TimeUnit;

pub type SampleRef = Arc<Sample>;

/// Lock mode requested by a [`SampleView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Exclusive,
    Read,
    ReadWrite,
}

impl LockMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, LockMode::Exclusive | LockMode::ReadWrite)
    }
}

#[derive(Debug, Clone, Copy)]
struct LockState {
    /// No lock of any kind is outstanding.
    available: bool,
    read_lock: bool,
    write_lock: bool,
    readers: u32,
}

impl LockState {
    fn can_acquire(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Exclusive | LockMode::ReadWrite => self.available,
            LockMode::Read => !self.write_lock,
        }
    }
}

/// Reference-counted, lockable media buffer.
pub struct Sample {
    state: Mutex<LockState>,
    cv: Condvar,
    timestamp: AtomicI64,
    buffer: Mutex<Option<Bytes>>,
}

impl Sample {
    pub fn new(timestamp: TimeUnit, buffer: Option<Bytes>) -> Self {
        Self {
            state: Mutex::new(LockState {
                available: true,
                read_lock: false,
                write_lock: false,
                readers: 0,
            }),
            cv: Condvar::new(),
            timestamp: AtomicI64::new(timestamp),
            buffer: Mutex::new(buffer),
        }
    }

    /// A sample without a backing buffer.
    pub fn empty() -> SampleRef {
        Arc::new(Self::new(0, None))
    }

    /// Presentation timestamp of the buffer content.
    pub fn timestamp(&self) -> TimeUnit {
        self.timestamp.load(Ordering::Acquire)
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().available
    }

    /// Block until no other holder exists, then take exclusive access.
    pub fn lock_sample(&self) {
        self.acquire(LockMode::Exclusive);
    }

    /// Release exclusive access.
    ///
    /// # Panics
    ///
    /// Panics if the sample is not exclusively locked.
    pub fn unlock_sample(&self) {
        let mut state = self.state.lock();
        assert!(
            state.write_lock && !state.read_lock,
            "unlock_sample without an exclusive lock"
        );
        state.write_lock = false;
        state.available = true;
        self.cv.notify_all();
    }

    /// Block until no writer holds the sample, then join the readers.
    pub fn read_lock_sample(&self) {
        self.acquire(LockMode::Read);
    }

    /// Leave the readers.
    ///
    /// # Panics
    ///
    /// Panics if no shared read lock is held.
    pub fn unlock_read_lock_sample(&self) {
        let mut state = self.state.lock();
        assert!(
            state.readers > 0 && !state.write_lock,
            "unlock_read_lock_sample without a read lock"
        );
        state.readers -= 1;
        if state.readers == 0 {
            state.read_lock = false;
            state.available = true;
            self.cv.notify_all();
        }
    }

    /// Block until no other holder exists, then take combined read and write
    /// access.
    pub fn read_write_lock_sample(&self) {
        self.acquire(LockMode::ReadWrite);
    }

    /// Release combined read and write access.
    ///
    /// # Panics
    ///
    /// Panics if the sample is not read-write locked.
    pub fn unlock_write_lock_sample(&self) {
        let mut state = self.state.lock();
        assert!(
            state.read_lock && state.write_lock,
            "unlock_write_lock_sample without a read-write lock"
        );
        state.read_lock = false;
        state.write_lock = false;
        state.readers = 0;
        state.available = true;
        self.cv.notify_all();
    }

    fn downgrade_write_lock(&self) {
        let mut state = self.state.lock();
        assert!(
            state.read_lock && state.write_lock,
            "downgrade without a read-write lock"
        );
        state.write_lock = false;
        self.cv.notify_all();
    }

    fn acquire(&self, mode: LockMode) {
        let mut state = self.state.lock();
        while !state.can_acquire(mode) {
            self.cv.wait(&mut state);
        }
        Self::grant(&mut state, mode);
    }

    fn try_acquire(&self, mode: LockMode) -> bool {
        let mut state = self.state.lock();
        if !state.can_acquire(mode) {
            return false;
        }
        Self::grant(&mut state, mode);
        true
    }

    fn grant(state: &mut LockState, mode: LockMode) {
        state.available = false;
        match mode {
            LockMode::Exclusive => state.write_lock = true,
            LockMode::Read => {
                state.readers += 1;
                state.read_lock = true;
            }
            LockMode::ReadWrite => {
                state.readers = 1;
                state.read_lock = true;
                state.write_lock = true;
            }
        }
    }

    fn release(&self, mode: LockMode) {
        match mode {
            LockMode::Exclusive => self.unlock_sample(),
            LockMode::Read => self.unlock_read_lock_sample(),
            LockMode::ReadWrite => self.unlock_write_lock_sample(),
        }
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("Sample")
            .field("timestamp", &self.timestamp())
            .field("available", &state.available)
            .field("read_lock", &state.read_lock)
            .field("write_lock", &state.write_lock)
            .finish()
    }
}

/// Scoped lock on a [`Sample`].
pub struct SampleView<'a> {
    sample: &'a Sample,
    mode: LockMode,
}

impl<'a> SampleView<'a> {
    /// Block until `mode` is obtainable on `sample`.
    pub fn new(sample: &'a Sample, mode: LockMode) -> Self {
        sample.acquire(mode);
        Self { sample, mode }
    }

    /// Take `mode` only if it is free right now.
    pub fn try_new(sample: &'a Sample, mode: LockMode) -> Option<Self> {
        sample
            .try_acquire(mode)
            .then_some(Self { sample, mode })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn timestamp(&self) -> TimeUnit {
        self.sample.timestamp()
    }

    /// Backing buffer; cloning `Bytes` shares the allocation.
    pub fn buffer(&self) -> Option<Bytes> {
        self.sample.buffer.lock().clone()
    }

    pub fn set_timestamp(&self, timestamp: TimeUnit) {
        assert!(self.mode.is_writable(), "timestamp written through a read view");
        self.sample.timestamp.store(timestamp, Ordering::Release);
    }

    pub fn set_buffer(&self, buffer: Option<Bytes>) {
        assert!(self.mode.is_writable(), "buffer written through a read view");
        *self.sample.buffer.lock() = buffer;
    }

    /// Turn a read-write view into a read view without releasing the sample.
    pub fn downgrade(mut self) -> Self {
        assert_eq!(self.mode, LockMode::ReadWrite, "only read-write views downgrade");
        self.sample.downgrade_write_lock();
        self.mode = LockMode::Read;
        self
    }
}

impl Drop for SampleView<'_> {
    fn drop(&mut self) {
        self.sample.release(self.mode);
    }
}
