//! Desktop capture source
//!
//! Runs on its own fixed-period timer rather than on requests: every frame
//! period it releases the previous hardware frame, acquires the next one
//! within a bounded timeout and publishes it through a single pooled sample.
//! While the consumer still holds that sample the new frame is dropped, so
//! at most one frame is ever in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::capture::{AcquireResult, FrameProducer};
use crate::pipeline::{
    ClockSink, FrameNumber, FrameRate, LockMode, MediaKind, Sample, SampleRef, SampleView,
    Schedulable, Session, SourceBase, SourceImpl, SourceRequest, TimeUnit, VideoArgs,
};

#[derive(Debug, Clone, Copy)]
pub struct DisplayCaptureOptions {
    pub frame_rate: FrameRate,
    /// Bound on a single frame acquisition
    pub acquire_timeout: Duration,
}

impl DisplayCaptureOptions {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            frame_rate,
            acquire_timeout: frame_rate.frame_interval(),
        }
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    samples_end: Option<FrameNumber>,
    /// Clock time and producer time of the first captured frame
    reference: Option<(TimeUnit, TimeUnit)>,
    holding_frame: bool,
    /// The pooled sample holds a frame that was not delivered yet
    fresh: bool,
}

pub struct DisplayCapture {
    producer: Mutex<Box<dyn FrameProducer>>,
    clock_sink: ClockSink,
    sample: SampleRef,
    frame_rate: FrameRate,
    acquire_timeout: Duration,
    state: Mutex<CaptureState>,
    stopped: AtomicBool,
}

impl DisplayCapture {
    /// Build the capture component around `producer`.
    pub fn create(
        session: &Arc<Session>,
        producer: Box<dyn FrameProducer>,
        options: DisplayCaptureOptions,
    ) -> Arc<SourceBase<Self>> {
        SourceBase::new_cyclic(session, options.frame_rate, |weak| {
            let target: Weak<dyn Schedulable> = weak.clone();
            Self {
                producer: Mutex::new(producer),
                clock_sink: ClockSink::new(
                    session.clock(),
                    session.work_queue().clone(),
                    target,
                    session.health().clone(),
                ),
                sample: Sample::empty(),
                frame_rate: options.frame_rate,
                acquire_timeout: options.acquire_timeout,
                state: Mutex::new(CaptureState::default()),
                stopped: AtomicBool::new(false),
            }
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.producer.lock().resolution()
    }

    /// One capture period. Errors only for an unusable producer.
    fn capture(&self, base: &SourceBase<Self>) -> anyhow::Result<()> {
        let mut producer = self.producer.lock();
        let mut state = self.state.lock();

        if state.holding_frame {
            producer.release_frame();
            state.holding_frame = false;
        }

        match producer.acquire_next_frame(self.acquire_timeout)? {
            AcquireResult::Timeout => {
                trace!("No new desktop frame this period");
                base.health().record_capture_timeout();
            }
            AcquireResult::Frame(frame) => {
                state.holding_frame = true;

                if Arc::strong_count(&self.sample) > 1 {
                    trace!("Consumer still holds the previous frame, dropping");
                    base.health().record_frame_drop();
                    return Ok(());
                }

                let now = base.clock().get_current_time();
                let (clock_start, present_start) =
                    *state.reference.get_or_insert((now, frame.present_time));
                let timestamp = clock_start + (frame.present_time - present_start);

                let view = SampleView::new(&self.sample, LockMode::Exclusive);
                view.set_timestamp(timestamp);
                view.set_buffer(Some(frame.data));
                drop(view);

                state.fresh = true;
                base.health().record_frame_captured();
            }
        }
        Ok(())
    }

    fn schedule_after(&self, base: &SourceBase<Self>, time: TimeUnit) {
        let rate = self.frame_rate;
        let now = base.clock().get_current_time();
        let mut next = rate.to_time(rate.to_frame(time) + 1);
        if next <= now {
            next = rate.to_time(rate.to_frame(now) + 1);
        }
        if !self.clock_sink.schedule_new_callback(next) {
            debug!("Desktop capture could not schedule {}", next);
        }
    }
}

impl SourceImpl for DisplayCapture {
    type Args = VideoArgs;

    const KIND: MediaKind = MediaKind::Video;

    fn name(&self) -> &str {
        "desktop-capture"
    }

    fn samples_end(&self) -> Option<FrameNumber> {
        self.state.lock().samples_end
    }

    fn make_request(
        &self,
        _request: &SourceRequest<Self>,
        frame_end: FrameNumber,
    ) -> anyhow::Result<VideoArgs> {
        let mut state = self.state.lock();
        let sample = if state.fresh {
            state.fresh = false;
            Some(self.sample.clone())
        } else {
            None
        };
        Ok(VideoArgs { sample, frame_end })
    }

    fn on_component_start(&self, base: &SourceBase<Self>, time: TimeUnit) -> anyhow::Result<()> {
        self.stopped.store(false, Ordering::Release);
        self.state.lock().reference = None;
        let (width, height) = self.resolution();
        debug!("Desktop capture {}x{} at {}", width, height, self.frame_rate);
        self.schedule_after(base, time);
        Ok(())
    }

    fn on_component_stop(&self, _base: &SourceBase<Self>, _time: TimeUnit) {
        self.stopped.store(true, Ordering::Release);
        self.clock_sink.clear_queue();

        let mut producer = self.producer.lock();
        let mut state = self.state.lock();
        if state.holding_frame {
            producer.release_frame();
            state.holding_frame = false;
        }
    }

    fn scheduled_callback(&self, base: &SourceBase<Self>, due_time: TimeUnit) {
        if self.stopped.load(Ordering::Acquire) || base.is_broken() {
            return;
        }

        if let Err(e) = self.capture(base) {
            base.break_on(e.context("desktop capture failed"));
            return;
        }

        {
            let mut state = self.state.lock();
            let end = self.frame_rate.to_frame(due_time);
            state.samples_end = Some(state.samples_end.map_or(end, |current| current.max(end)));
        }
        base.serve();
        self.schedule_after(base, due_time);
    }
}
