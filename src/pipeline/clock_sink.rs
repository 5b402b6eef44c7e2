//! Clock-driven callback scheduling
//!
//! [`ClockSink`] keeps the due times a component asked for in a sorted set
//! and arms exactly one timer, for the earliest of them. When it fires the
//! component's [`Schedulable::scheduled_callback`] runs on the work queue and
//! the timer is re-armed for whatever is next.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Instant;

use log::{debug, trace};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::clock::MediaClock;
use super::executor::WorkQueue;
use super::health::PipelineHealth;
use super::types::{TimeUnit, duration_from_time_unit};

/// A component that wants to be woken at presentation times of its choosing.
pub trait Schedulable: Send + Sync {
    fn scheduled_callback(&self, due_time: TimeUnit);
}

#[derive(Default)]
struct SinkState {
    pending: BTreeSet<TimeUnit>,
    /// Due time the armed timer was set for, with its cancel handle.
    timer: Option<(TimeUnit, CancellationToken)>,
}

struct Inner {
    clock: Weak<MediaClock>,
    work_queue: WorkQueue,
    target: Weak<dyn Schedulable>,
    health: Arc<PipelineHealth>,
    state: Mutex<SinkState>,
}

/// Sorted set of pending due times backed by a single timer.
#[derive(Clone)]
pub struct ClockSink {
    inner: Arc<Inner>,
}

impl ClockSink {
    pub fn new(
        clock: &Arc<MediaClock>,
        work_queue: WorkQueue,
        target: Weak<dyn Schedulable>,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock: Arc::downgrade(clock),
                work_queue,
                target,
                health,
                state: Mutex::new(SinkState::default()),
            }),
        }
    }

    /// Ask for a callback at `due_time`.
    ///
    /// Returns `false` when nothing was scheduled: either the clock is gone,
    /// in which case every pending callback is dropped as well, or
    /// `due_time` has already passed, which counts as a missed deadline.
    pub fn schedule_new_callback(&self, due_time: TimeUnit) -> bool {
        let Some(clock) = self.inner.clock.upgrade() else {
            debug!("Clock gone, dropping scheduled callbacks");
            self.clear_queue();
            return false;
        };

        let now = clock.get_current_time();
        if due_time <= now {
            trace!("Missed deadline {} (now {})", due_time, now);
            self.inner.health.record_missed_deadline();
            return false;
        }

        let mut state = self.inner.state.lock();
        if !state.pending.insert(due_time) {
            return true;
        }
        if state.pending.first() == Some(&due_time) {
            Inner::arm(&self.inner, &mut state, due_time, now);
        }
        true
    }

    /// Cancel the armed timer and forget every pending due time.
    pub fn clear_queue(&self) {
        let mut state = self.inner.state.lock();
        if let Some((_, token)) = state.timer.take() {
            token.cancel();
        }
        state.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn next_due_time(&self) -> Option<TimeUnit> {
        self.inner.state.lock().pending.first().copied()
    }
}

impl Inner {
    fn arm(this: &Arc<Self>, state: &mut SinkState, due_time: TimeUnit, now: TimeUnit) {
        if let Some((_, token)) = state.timer.take() {
            token.cancel();
        }

        let deadline = Instant::now() + duration_from_time_unit(due_time - now);
        let weak = Arc::downgrade(this);
        let token = this.work_queue.schedule_at(deadline, move || {
            if let Some(inner) = weak.upgrade() {
                inner.fire(due_time);
            }
        });
        state.timer = Some((due_time, token));
    }

    fn fire(self: Arc<Self>, due_time: TimeUnit) {
        {
            let mut state = self.state.lock();
            match &state.timer {
                Some((armed, _)) if *armed == due_time => {}
                // Superseded by an earlier due time.
                _ => return,
            }
            state.timer = None;
            if !state.pending.remove(&due_time) {
                return;
            }
        }

        if let Some(target) = self.target.upgrade() {
            target.scheduled_callback(due_time);
        }

        self.rearm();
    }

    fn rearm(self: Arc<Self>) {
        let Some(clock) = self.clock.upgrade() else {
            let mut state = self.state.lock();
            state.pending.clear();
            return;
        };
        let now = clock.get_current_time();

        let mut state = self.state.lock();
        if state.timer.is_some() {
            return;
        }
        if let Some(&next) = state.pending.first() {
            // Already late callbacks still fire, immediately.
            Inner::arm(&self, &mut state, next, now.min(next));
        }
    }
}

impl std::fmt::Debug for ClockSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ClockSink")
            .field("pending", &state.pending)
            .field("armed", &state.timer.as_ref().map(|(due, _)| *due))
            .finish()
    }
}
