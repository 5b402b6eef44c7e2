//! Pull framework for source components
//!
//! A source component ([`SourceBase`]) owns one [`SourceStream`] per topology
//! it takes part in. Downstream nodes push requests into the component's
//! request queue through those streams; the serve loop answers them strictly
//! in packet order as soon as the component has data up to the requested
//! frame, and dispatches each answer on the work queue.
//!
//! A component that cannot produce valid data is marked broken. From then on
//! the framework answers every request at once with a skip payload ending at
//! the requested frame, so downstream keeps advancing, and the controller is
//! asked once to rebuild the component. Its drain boundary follows the clock.
//! A stopped component answers what is still queued the same way, so a
//! replaced topology can drain through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::errors::PipelineError;

use super::clock::MediaClock;
use super::clock_sink::Schedulable;
use super::executor::WorkQueue;
use super::health::PipelineHealth;
use super::message_generator::{ComponentKey, StreamListener};
use super::request_queue::{Request, RequestQueue};
use super::session::Session;
use super::topology::{MediaStream, StreamId, Topology};
use super::types::{FrameNumber, FrameRate, MediaKind, Payload, RequestPacket, SourceArgs, TimeUnit};

/// Entry of a source's request queue.
pub type SourceRequest<S> = Request<Arc<SourceStream<S>>, <S as SourceImpl>::Args>;

/// What a concrete source plugs into [`SourceBase`].
pub trait SourceImpl: Send + Sync + Sized + 'static {
    type Args: SourceArgs;

    const KIND: MediaKind;

    fn name(&self) -> &str;

    /// Last frame boundary the source holds data for, if any.
    fn samples_end(&self) -> Option<FrameNumber>;

    /// Build the answer to `request`, covering data up to `frame_end`.
    ///
    /// An error marks the component broken; the request is then answered
    /// with a skip payload.
    fn make_request(
        &self,
        request: &SourceRequest<Self>,
        frame_end: FrameNumber,
    ) -> anyhow::Result<Self::Args>;

    fn on_component_start(&self, _base: &SourceBase<Self>, _time: TimeUnit) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_component_stop(&self, _base: &SourceBase<Self>, _time: TimeUnit) {}

    fn scheduled_callback(&self, _base: &SourceBase<Self>, _due_time: TimeUnit) {}
}

/// Single-server gate for a serve loop.
///
/// A caller that finds the loop busy leaves a note and returns; the active
/// server runs another pass for it before letting go.
#[derive(Debug, Default)]
pub struct ServeGate {
    requested: AtomicBool,
    lock: Mutex<()>,
}

impl ServeGate {
    pub fn run(&self, health: &PipelineHealth, mut serve: impl FnMut()) {
        self.requested.store(true, Ordering::Release);
        loop {
            let Some(guard) = self.lock.try_lock() else {
                health.record_serve_reentry();
                return;
            };
            while self.requested.swap(false, Ordering::AcqRel) {
                serve();
            }
            drop(guard);
            if !self.requested.load(Ordering::Acquire) {
                return;
            }
        }
    }
}

/// Generic source component.
pub struct SourceBase<S: SourceImpl> {
    key: ComponentKey,
    imp: S,
    session: Weak<Session>,
    clock: Arc<MediaClock>,
    work_queue: WorkQueue,
    health: Arc<PipelineHealth>,
    frame_rate: FrameRate,
    requests: Mutex<RequestQueue<SourceRequest<S>>>,
    gate: ServeGate,
    /// Topologies this component currently serves, oldest first.
    active_topology: Mutex<Vec<Weak<Topology>>>,
    broken: AtomicBool,
    stopped: AtomicBool,
    reinit_requested: AtomicBool,
    weak_self: Weak<Self>,
}

impl<S: SourceImpl> SourceBase<S> {
    /// Build the component; `build` receives the component's own weak
    /// handle, for timers that must call back into it.
    pub fn new_cyclic(
        session: &Arc<Session>,
        frame_rate: FrameRate,
        build: impl FnOnce(&Weak<Self>) -> S,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            key: ComponentKey::next(),
            imp: build(weak),
            session: Arc::downgrade(session),
            clock: session.clock().clone(),
            work_queue: session.work_queue().clone(),
            health: session.health().clone(),
            frame_rate,
            requests: Mutex::new(RequestQueue::new()),
            gate: ServeGate::default(),
            active_topology: Mutex::new(Vec::new()),
            broken: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            reinit_requested: AtomicBool::new(false),
            weak_self: weak.clone(),
        })
    }

    pub fn key(&self) -> ComponentKey {
        self.key
    }

    pub fn imp(&self) -> &S {
        &self.imp
    }

    pub fn clock(&self) -> &Arc<MediaClock> {
        &self.clock
    }

    pub fn work_queue(&self) -> &WorkQueue {
        &self.work_queue
    }

    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn weak(&self) -> Weak<Self> {
        self.weak_self.clone()
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether requests are answered with skip frames instead of data.
    fn is_skipping(&self) -> bool {
        self.is_broken() || self.is_stopped()
    }

    /// Frame boundary the component can answer up to. A broken or stopped
    /// component follows the clock.
    pub fn samples_end(&self) -> Option<FrameNumber> {
        if self.is_skipping() {
            Some(self.frame_rate.to_frame(self.clock.get_current_time()))
        } else {
            self.imp.samples_end()
        }
    }

    /// Mark the component broken and ask, once, to have it rebuilt.
    ///
    /// The flag is never cleared: a broken component is replaced, not
    /// repaired.
    pub fn set_broken(&self, suppress_reinitialization: bool) {
        self.mark_broken();
        if !suppress_reinitialization {
            self.request_reinitialization_once();
        }
        self.serve();
    }

    /// Report `err` to the controller and mark the component broken.
    pub fn break_on(&self, err: anyhow::Error) {
        self.fail(err);
        self.serve();
    }

    fn fail(&self, err: anyhow::Error) {
        warn!("Source {} failed: {:#}", self.imp.name(), err);
        if let Some(session) = self.session.upgrade() {
            session.report(PipelineError::Capture(err));
        }
        self.mark_broken();
        self.request_reinitialization_once();
    }

    fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::AcqRel) {
            warn!("Source {} is broken, serving skip frames", self.imp.name());
        }
    }

    fn request_reinitialization_once(&self) {
        if self
            .reinit_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.health.record_reinit_request();
        if let Some(session) = self.session.upgrade() {
            session.request_reinitialization(self.key, self.imp.name());
        }
    }

    /// Answer every queued request that can be answered now.
    pub fn serve(&self) {
        self.gate.run(&self.health, || self.serve_pending());
    }

    fn serve_pending(&self) {
        loop {
            let Some((request, frame_end, skipping)) = self.next_servable() else {
                break;
            };

            let args = if skipping {
                self.health.record_skip_frame();
                S::Args::skip(frame_end)
            } else {
                match self.imp.make_request(&request, frame_end) {
                    Ok(args) => args,
                    Err(e) => {
                        self.fail(e.context("failed to answer a request"));
                        self.health.record_skip_frame();
                        S::Args::skip(frame_end)
                    }
                }
            };

            if request.rp.ends_topology() {
                request.stream.mark_drained();
                self.retire_topology(&request.rp.topology);
            }

            self.dispatch(request, args);
        }
    }

    /// Pop the front request if the component has data up to its frame.
    fn next_servable(&self) -> Option<(SourceRequest<S>, FrameNumber, bool)> {
        let mut requests = self.requests.lock();
        let front = requests.peek()?;
        let requested = self.frame_rate.to_frame(front.rp.request_time);
        let skipping = self.is_skipping();

        if !skipping {
            match self.imp.samples_end() {
                Some(end) if end >= requested => {}
                _ => return None,
            }
        }
        requests.pop().map(|request| (request, requested, skipping))
    }

    fn dispatch(&self, request: SourceRequest<S>, args: S::Args) {
        let session = self.session.clone();
        let from = request.stream.id();
        let rp = request.rp;
        trace!(
            "{} dispatching packet {} up to frame {}",
            self.imp.name(),
            rp.packet_number,
            args.frame_end()
        );
        self.work_queue.submit(move || {
            if let Some(session) = session.upgrade() {
                session.give_sample(from, args.into_payload(), &rp);
            }
        });
    }

    fn push_request(&self, request: SourceRequest<S>) -> bool {
        let result = self.requests.lock().push(request);
        match result {
            Ok(()) => true,
            Err(e) => {
                if let Some(session) = self.session.upgrade() {
                    session.report(e);
                }
                false
            }
        }
    }

    fn activate_topology(&self, topology: Weak<Topology>) {
        let mut active = self.active_topology.lock();
        if !active.iter().any(|t| t.ptr_eq(&topology)) {
            active.push(topology);
        }
    }

    fn retire_topology(&self, topology: &Arc<Topology>) {
        let mut active = self.active_topology.lock();
        active.retain(|t| t.strong_count() > 0 && !std::ptr::eq(t.as_ptr(), Arc::as_ptr(topology)));
    }

    /// Whether `topology` is the oldest topology still served.
    fn is_front_topology(&self, topology: &Weak<Topology>) -> bool {
        let mut active = self.active_topology.lock();
        active.retain(|t| t.strong_count() > 0);
        active.first().is_some_and(|front| front.ptr_eq(topology))
    }

    pub fn active_topology_count(&self) -> usize {
        let mut active = self.active_topology.lock();
        active.retain(|t| t.strong_count() > 0);
        active.len()
    }

    fn component_start(&self, time: TimeUnit) {
        debug!("Source {} starting at {}", self.imp.name(), time);
        self.stopped.store(false, Ordering::Release);
        if let Err(e) = self.imp.on_component_start(self, time) {
            self.break_on(e.context("failed to start"));
        }
    }

    fn component_stop(&self, time: TimeUnit) {
        debug!("Source {} stopping at {}", self.imp.name(), time);
        self.stopped.store(true, Ordering::Release);
        self.imp.on_component_stop(self, time);
        // Requests of a topology still draining get skip frames.
        self.serve();
    }
}

impl<S: SourceImpl> Schedulable for SourceBase<S> {
    fn scheduled_callback(&self, due_time: TimeUnit) {
        self.imp.scheduled_callback(self, due_time);
    }
}

impl<S: SourceImpl> std::fmt::Debug for SourceBase<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBase")
            .field("name", &self.imp.name())
            .field("key", &self.key)
            .field("broken", &self.is_broken())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The stream a source component exposes in one topology.
pub struct SourceStream<S: SourceImpl> {
    id: StreamId,
    base: Arc<SourceBase<S>>,
    topology: Mutex<Weak<Topology>>,
    drained: AtomicBool,
    weak_self: Weak<Self>,
}

impl<S: SourceImpl> SourceStream<S> {
    pub fn new(base: &Arc<SourceBase<S>>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            id: StreamId::next(),
            base: base.clone(),
            topology: Mutex::new(Weak::new()),
            drained: AtomicBool::new(false),
            weak_self: weak.clone(),
        })
    }

    pub fn base(&self) -> &Arc<SourceBase<S>> {
        &self.base
    }

    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    fn mark_drained(&self) {
        self.drained.store(true, Ordering::Release);
    }
}

impl<S: SourceImpl> StreamListener for SourceStream<S> {
    fn on_component_start(&self, time: TimeUnit) {
        self.base.component_start(time);
    }

    fn on_component_stop(&self, time: TimeUnit) {
        self.base.component_stop(time);
    }

    fn on_stream_start(&self, _time: TimeUnit) {
        let topology = self.topology.lock().clone();
        self.base.activate_topology(topology);
    }

    fn on_stream_stop(&self, time: TimeUnit) {
        trace!("{} stream {} stopped at {}", self.base.imp.name(), self.id, time);
    }

    fn is_drainable_or_drained(&self, drain_time: TimeUnit) -> bool {
        if self.is_drained() {
            return true;
        }

        let target = self.base.frame_rate.to_frame(drain_time);
        let reached = self.base.samples_end().is_some_and(|end| end >= target);
        if !reached {
            return false;
        }

        let topology = self.topology.lock().clone();
        if topology.strong_count() > 0 && !self.base.is_front_topology(&topology) {
            return false;
        }

        self.mark_drained();
        true
    }
}

impl<S: SourceImpl> MediaStream for SourceStream<S> {
    fn id(&self) -> StreamId {
        self.id
    }

    fn component_key(&self) -> ComponentKey {
        self.base.key
    }

    fn media_kind(&self) -> Option<MediaKind> {
        Some(S::KIND)
    }

    fn attach_topology(&self, topology: Weak<Topology>) {
        *self.topology.lock() = topology;
    }

    fn request_sample(&self, rp: &RequestPacket) {
        let Some(stream) = self.weak_self.upgrade() else {
            return;
        };
        if self.base.push_request(Request::new(stream, rp.clone())) {
            self.process_sample(None, None, rp);
        }
    }

    fn process_sample(&self, _prev: Option<StreamId>, _payload: Option<Payload>, _rp: &RequestPacket) {
        self.base.serve();
    }
}
