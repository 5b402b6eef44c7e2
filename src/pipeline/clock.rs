//! Presentation clock

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use super::types::{TimeUnit, time_unit_from_duration};

/// Monotonic tick source the clock reads wall time from.
///
/// Constructed once at process start and handed down to every clock, so the
/// time base has a single initialization point.
pub trait TimeSource: Send + Sync {
    /// Ticks elapsed since an arbitrary, fixed origin.
    fn now(&self) -> TimeUnit;
}

/// Tick source backed by `Instant`.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> TimeUnit {
        time_unit_from_duration(self.origin.elapsed())
    }
}

/// Tick source that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    ticks: Arc<AtomicI64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: TimeUnit) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    pub fn set(&self, ticks: TimeUnit) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> TimeUnit {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockState {
    running: bool,
    /// Source time at which the clock was last started.
    start_time: TimeUnit,
    /// Presentation time accumulated before the last start.
    elapsed: TimeUnit,
    /// Presentation time the clock was last started at.
    offset: TimeUnit,
}

/// Media clock driving every scheduled callback of a session.
///
/// While running, `get_current_time` advances with the tick source; when
/// stopped it is frozen at the accumulated elapsed time.
///
/// # Thread Safety
///
/// All state sits behind one mutex; the clock is shared through `Arc`, and
/// components that must notice a torn down session keep a `Weak` to it.
pub struct MediaClock {
    source: Arc<dyn TimeSource>,
    state: Mutex<ClockState>,
}

impl MediaClock {
    /// Create a stopped clock at time zero
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            state: Mutex::new(ClockState {
                running: false,
                start_time: 0,
                elapsed: 0,
                offset: 0,
            }),
        }
    }

    /// Create a stopped clock reading wall time
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource::new()))
    }

    /// Start the clock. No-op if already running.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.running {
            return;
        }
        state.start_time = self.source.now();
        state.offset = state.elapsed;
        state.running = true;
    }

    /// Stop the clock, freezing the elapsed time.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        state.elapsed += self.source.now() - state.start_time;
        state.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Current presentation time.
    pub fn get_current_time(&self) -> TimeUnit {
        let state = self.state.lock();
        if state.running {
            state.elapsed + (self.source.now() - state.start_time).max(0)
        } else {
            state.elapsed
        }
    }

    /// Presentation time at which the clock was last started.
    pub fn get_start_time(&self) -> TimeUnit {
        self.state.lock().offset
    }

    /// Reposition a stopped clock.
    ///
    /// # Panics
    ///
    /// Panics if the clock is running.
    pub fn set_current_time(&self, time: TimeUnit) {
        let mut state = self.state.lock();
        assert!(!state.running, "set_current_time called on a running clock");
        state.elapsed = time;
    }
}

impl std::fmt::Debug for MediaClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("MediaClock")
            .field("running", &state.running)
            .field("elapsed", &state.elapsed)
            .field("offset", &state.offset)
            .finish()
    }
}
