//! Session: the controller-facing side of the pipeline
//!
//! A session owns the presentation clock, the work queue and the health
//! counters shared by every node, routes requests and replies along the
//! edges of the live topology, and serializes structural changes (start,
//! switch, stop) behind one control lock.
//!
//! Lock order: the control lock may be held while nodes take their own
//! locks, never the other way round. Nothing a node calls on the session
//! takes the control lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::errors::{PipelineError, Result};

use super::clock::MediaClock;
use super::executor::WorkQueue;
use super::health::PipelineHealth;
use super::message_generator::ComponentKey;
use super::state::PipelineState;
use super::topology::{StreamId, TopologyRef};
use super::types::{Payload, RequestPacket, TimeUnit};

const NO_DRAIN: TimeUnit = TimeUnit::MAX;

/// Notifications for the controller.
#[derive(Debug)]
pub enum SessionEvent {
    Started { topology: u64 },
    Switched { from: u64, to: u64 },
    /// The topology drained (or timed out draining) and was torn down.
    Stopped { topology: u64 },
    /// A broken component wants to be rebuilt.
    ReinitializeRequested { component: ComponentKey, name: String },
    /// An error raised inside the pipeline. [`PipelineError::is_fatal`]
    /// tells whether the live topology is lost.
    Error(PipelineError),
}

/// Drain behaviour of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub drain_timeout: Duration,
    pub drain_poll: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(2),
            drain_poll: Duration::from_millis(5),
        }
    }
}

struct Control {
    state: PipelineState,
    current: Option<TopologyRef>,
}

pub struct Session {
    clock: Arc<MediaClock>,
    work_queue: WorkQueue,
    health: Arc<PipelineHealth>,
    options: SessionOptions,
    control: Mutex<Control>,
    drain_time: AtomicI64,
    failed: AtomicBool,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    pub fn new(
        clock: Arc<MediaClock>,
        work_queue: WorkQueue,
        health: Arc<PipelineHealth>,
        options: SessionOptions,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            clock,
            work_queue,
            health,
            options,
            control: Mutex::new(Control {
                state: PipelineState::Idle,
                current: None,
            }),
            drain_time: AtomicI64::new(NO_DRAIN),
            failed: AtomicBool::new(false),
            events,
        });
        (session, rx)
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

    pub fn state(&self) -> PipelineState {
        if self.failed.load(Ordering::Acquire) {
            return PipelineState::Failed;
        }
        self.control.lock().state
    }

    pub fn current_topology(&self) -> Option<TopologyRef> {
        self.control.lock().current.clone()
    }

    /// Presentation time the live topology drains to, once a stop was asked.
    pub fn drain_time(&self) -> Option<TimeUnit> {
        match self.drain_time.load(Ordering::Acquire) {
            NO_DRAIN => None,
            time => Some(time),
        }
    }

    /// Make `topology` the live topology.
    ///
    /// From idle or stopped the clock is positioned at `time` and started.
    /// With a topology already running this is a seamless switch and `time`
    /// is ignored in favour of the current clock time.
    pub fn start_topology(&self, topology: &TopologyRef, time: TimeUnit) -> Result<()> {
        let mut control = self.control.lock();
        self.check_not_failed(&control, "start a topology")?;

        if control.state.is_running() {
            return self.handoff_locked(&mut control, topology);
        }

        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        if !control.state.can_transition_to(&running) {
            return Err(PipelineError::InvalidState {
                action: "start a topology",
                state: control.state,
            });
        }

        self.clock.stop();
        self.clock.set_current_time(time);
        self.drain_time.store(NO_DRAIN, Ordering::Release);
        self.clock.start();

        info!("Starting topology {} at {}", topology.id(), time);
        topology.message_generator().clock_start(time);
        control.state = running;
        control.current = Some(topology.clone());
        self.emit(SessionEvent::Started {
            topology: topology.id(),
        });
        Ok(())
    }

    /// Replace the running topology without stopping shared components.
    pub fn switch_topology(&self, topology: &TopologyRef) -> Result<()> {
        let mut control = self.control.lock();
        self.check_not_failed(&control, "switch topologies")?;
        if !control.state.is_running() {
            return Err(PipelineError::NotRunning);
        }
        self.handoff_locked(&mut control, topology)
    }

    fn handoff_locked(&self, control: &mut Control, topology: &TopologyRef) -> Result<()> {
        let Some(prev) = control.current.take() else {
            return Err(PipelineError::NotRunning);
        };
        if Arc::ptr_eq(&prev, topology) {
            control.current = Some(prev);
            return Ok(());
        }

        let time = self.clock.get_current_time();
        info!(
            "Switching topology {} -> {} at {}",
            prev.id(),
            topology.id(),
            time
        );
        topology
            .message_generator()
            .clock_start_with_handoff(time, prev.message_generator());
        self.retire_after_drain(prev.clone(), time);

        control.current = Some(topology.clone());
        self.emit(SessionEvent::Switched {
            from: prev.id(),
            to: topology.id(),
        });
        Ok(())
    }

    /// Keep routing replies for a replaced topology until its streams have
    /// consumed their final packets, then tear it down.
    fn retire_after_drain(&self, prev: TopologyRef, time: TimeUnit) {
        let options = self.options;
        let events = self.events.clone();
        self.work_queue.handle().spawn(async move {
            let deadline = Instant::now() + options.drain_timeout;
            while !prev.message_generator().is_drainable(time) {
                if Instant::now() >= deadline {
                    warn!("Replaced topology {} did not drain, dropping it", prev.id());
                    let _ = events.send(SessionEvent::Error(PipelineError::DrainTimeout(
                        options.drain_timeout,
                    )));
                    break;
                }
                tokio::time::sleep(options.drain_poll).await;
            }
            debug!("Replaced topology {} retired", prev.id());
            prev.shutdown();
        });
    }

    /// Drain the live topology up to `time`, then tear it down.
    ///
    /// Returns once draining has begun; completion is reported with
    /// [`SessionEvent::Stopped`].
    pub fn stop_topology(self: &Arc<Self>, time: TimeUnit) -> Result<()> {
        let topology = {
            let mut control = self.control.lock();
            let draining = PipelineState::Draining { drain_time: time };
            if !control.state.can_transition_to(&draining) {
                return Err(PipelineError::NotRunning);
            }
            let Some(topology) = control.current.clone() else {
                return Err(PipelineError::NotRunning);
            };
            control.state = draining;
            self.drain_time.store(time, Ordering::Release);
            topology
        };

        info!("Draining topology {} to {}", topology.id(), time);
        let session = self.clone();
        self.work_queue.handle().spawn(async move {
            let deadline = Instant::now() + session.options.drain_timeout;
            loop {
                if topology.message_generator().is_drainable(time) {
                    debug!("Topology {} drained", topology.id());
                    break;
                }
                if Instant::now() >= deadline {
                    warn!("Topology {} did not drain, stopping anyway", topology.id());
                    session.report(PipelineError::DrainTimeout(session.options.drain_timeout));
                    break;
                }
                tokio::time::sleep(session.options.drain_poll).await;
            }
            session.finish_stop(&topology, time);
        });
        Ok(())
    }

    fn finish_stop(&self, topology: &TopologyRef, time: TimeUnit) {
        let mut control = self.control.lock();
        topology.message_generator().clock_stop(time);
        topology.shutdown();
        self.clock.stop();

        if control.state.can_transition_to(&PipelineState::Stopped) {
            control.state = PipelineState::Stopped;
        }
        if control
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, topology))
        {
            control.current = None;
        }
        info!("Topology {} stopped", topology.id());
        self.emit(SessionEvent::Stopped {
            topology: topology.id(),
        });
    }

    /// Tear the live topology down immediately, without draining.
    pub fn abort(&self) {
        let mut control = self.control.lock();
        if let Some(topology) = control.current.take() {
            let time = self.clock.get_current_time();
            warn!("Aborting topology {} at {}", topology.id(), time);
            topology.message_generator().clock_stop(time);
            topology.shutdown();
        }
        self.clock.stop();
        control.state = PipelineState::Failed;
    }

    /// Forward `rp` to every node feeding `from`.
    pub fn request_sample(&self, from: StreamId, rp: &RequestPacket) {
        let topology = &rp.topology;
        for upstream in topology.upstream(from) {
            if let Some(stream) = topology.stream(*upstream) {
                stream.request_sample(rp);
            }
        }
    }

    /// Deliver a reply from `from` to every node it feeds.
    ///
    /// Replies for a topology that has been torn down are discarded.
    pub fn give_sample(&self, from: StreamId, payload: Payload, rp: &RequestPacket) {
        let topology = &rp.topology;
        if topology.is_torn_down() {
            trace!(
                "Discarding packet {} for torn down topology {}",
                rp.packet_number,
                topology.id()
            );
            return;
        }
        for downstream in topology.downstream(from) {
            if let Some(stream) = topology.stream(*downstream) {
                stream.process_sample(Some(from), Some(payload.clone()), rp);
            }
        }
    }

    /// Ask the controller to rebuild a component.
    pub fn request_reinitialization(&self, component: ComponentKey, name: &str) {
        info!("Component {} ({:?}) asks for reinitialization", name, component);
        self.emit(SessionEvent::ReinitializeRequested {
            component,
            name: name.to_string(),
        });
    }

    /// Hand an error to the controller. A fatal error also marks the
    /// session failed.
    pub fn report(&self, err: PipelineError) {
        if err.is_fatal() {
            error!("Pipeline error: {}", err);
            self.failed.store(true, Ordering::Release);
        } else {
            debug!("Pipeline warning: {}", err);
        }
        self.emit(SessionEvent::Error(err));
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn check_not_failed(&self, control: &Control, action: &'static str) -> Result<()> {
        if self.failed.load(Ordering::Acquire) || control.state == PipelineState::Failed {
            return Err(PipelineError::InvalidState {
                action,
                state: PipelineState::Failed,
            });
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event dropped, controller gone");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("clock", &self.clock)
            .field("drain_time", &self.drain_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::ManualTimeSource;
    use crate::pipeline::message_generator::StreamListener;
    use crate::pipeline::topology::{MediaStream, Topology};
    use crate::pipeline::types::{RequestFlags, SourceArgs, VideoArgs};
    use std::sync::atomic::AtomicUsize;

    /// Stream that counts what reaches it and drains on demand.
    struct CountingStream {
        id: StreamId,
        key: ComponentKey,
        requests: AtomicUsize,
        replies: AtomicUsize,
        drained: AtomicBool,
        component_events: AtomicUsize,
    }

    impl CountingStream {
        fn new(key: ComponentKey) -> Arc<Self> {
            Arc::new(Self {
                id: StreamId::next(),
                key,
                requests: AtomicUsize::new(0),
                replies: AtomicUsize::new(0),
                drained: AtomicBool::new(false),
                component_events: AtomicUsize::new(0),
            })
        }
    }

    impl StreamListener for CountingStream {
        fn on_component_start(&self, _time: TimeUnit) {
            self.component_events.fetch_add(1, Ordering::SeqCst);
        }

        fn on_component_stop(&self, _time: TimeUnit) {
            self.component_events.fetch_add(1, Ordering::SeqCst);
        }

        fn is_drainable_or_drained(&self, _drain_time: TimeUnit) -> bool {
            self.drained.load(Ordering::SeqCst)
        }
    }

    impl MediaStream for CountingStream {
        fn id(&self) -> StreamId {
            self.id
        }

        fn component_key(&self) -> ComponentKey {
            self.key
        }

        fn request_sample(&self, _rp: &RequestPacket) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }

        fn process_sample(&self, _prev: Option<StreamId>, _payload: Option<Payload>, _rp: &RequestPacket) {
            self.replies.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(options: SessionOptions) -> (Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>) {
        let clock = Arc::new(MediaClock::new(Arc::new(ManualTimeSource::new())));
        Session::new(
            clock,
            WorkQueue::current().unwrap(),
            Arc::new(PipelineHealth::new()),
            options,
        )
    }

    fn pair() -> (TopologyRef, Arc<CountingStream>, Arc<CountingStream>) {
        let source = CountingStream::new(ComponentKey::next());
        let sink = CountingStream::new(ComponentKey::next());
        let mut builder = Topology::builder();
        let up = builder.add_stream(source.clone());
        let down = builder.add_stream(sink.clone());
        builder.connect(up, down);
        (builder.build(), source, sink)
    }

    fn packet(topology: &TopologyRef) -> RequestPacket {
        RequestPacket {
            topology: topology.clone(),
            flags: RequestFlags::NONE,
            request_time: 0,
            timestamp: 0,
            packet_number: 0,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_routing_follows_edges() {
        let (session, _events) = session(SessionOptions::default());
        let (topology, source, sink) = pair();
        session.start_topology(&topology, 0).unwrap();

        let rp = packet(&topology);
        session.request_sample(sink.id, &rp);
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);

        session.give_sample(source.id, VideoArgs::skip(1).into_payload(), &rp);
        assert_eq!(sink.replies.load(Ordering::SeqCst), 1);

        topology.shutdown();
        session.give_sample(source.id, VideoArgs::skip(2).into_payload(), &rp);
        assert_eq!(sink.replies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_positions_clock() {
        let (session, mut events) = session(SessionOptions::default());
        let (topology, source, _sink) = pair();
        session.start_topology(&topology, 4_000).unwrap();

        assert!(session.clock().is_running());
        assert_eq!(session.clock().get_current_time(), 4_000);
        assert!(session.state().is_running());
        assert_eq!(source.component_events.load(Ordering::SeqCst), 1);
        assert!(matches!(events.recv().await, Some(SessionEvent::Started { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_drain() {
        let (session, mut events) = session(SessionOptions::default());
        let (topology, source, sink) = pair();
        session.start_topology(&topology, 0).unwrap();
        let _ = events.recv().await;

        session.stop_topology(100).unwrap();
        assert_eq!(session.drain_time(), Some(100));
        assert!(session.state().is_draining());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(session.state().is_draining());
        assert!(!topology.is_torn_down());

        source.drained.store(true, Ordering::SeqCst);
        sink.drained.store(true, Ordering::SeqCst);
        assert!(matches!(events.recv().await, Some(SessionEvent::Stopped { .. })));
        assert_eq!(session.state(), PipelineState::Stopped);
        assert!(topology.is_torn_down());
        assert!(!session.clock().is_running());
        assert_eq!(source.component_events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_timeout_still_stops() {
        let options = SessionOptions {
            drain_timeout: Duration::from_millis(20),
            drain_poll: Duration::from_millis(2),
        };
        let (session, mut events) = session(options);
        let (topology, _source, _sink) = pair();
        session.start_topology(&topology, 0).unwrap();
        let _ = events.recv().await;

        session.stop_topology(100).unwrap();
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Error(PipelineError::DrainTimeout(_)))
        ));
        assert!(matches!(events.recv().await, Some(SessionEvent::Stopped { .. })));
        assert!(topology.is_torn_down());
        assert!(!session.is_failed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_switch_keeps_shared_component_running() {
        let (session, _events) = session(SessionOptions::default());
        let shared_key = ComponentKey::next();
        let first = CountingStream::new(shared_key);
        let second = CountingStream::new(shared_key);

        let mut builder = Topology::builder();
        builder.add_stream(first.clone());
        let t1 = builder.build();
        let mut builder = Topology::builder();
        builder.add_stream(second.clone());
        let t2 = builder.build();

        assert!(matches!(
            session.switch_topology(&t2),
            Err(PipelineError::NotRunning)
        ));
        session.start_topology(&t1, 0).unwrap();
        first.drained.store(true, Ordering::SeqCst);
        session.switch_topology(&t2).unwrap();

        assert_eq!(first.component_events.load(Ordering::SeqCst), 1);
        assert_eq!(second.component_events.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&session.current_topology().unwrap(), &t2));
        wait_torn_down(&t1).await;
    }

    async fn wait_torn_down(topology: &TopologyRef) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !topology.is_torn_down() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("replaced topology was never torn down");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replaced_topology_routes_until_drained() {
        let (session, _events) = session(SessionOptions::default());
        let (t1, old_source, old_sink) = pair();
        let (t2, _new_source, _new_sink) = pair();
        session.start_topology(&t1, 0).unwrap();
        session.switch_topology(&t2).unwrap();

        // Replies still in flight for the replaced topology are delivered.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!t1.is_torn_down());
        let rp = packet(&t1);
        session.give_sample(old_source.id, VideoArgs::skip(1).into_payload(), &rp);
        assert_eq!(old_sink.replies.load(Ordering::SeqCst), 1);

        old_source.drained.store(true, Ordering::SeqCst);
        old_sink.drained.store(true, Ordering::SeqCst);
        wait_torn_down(&t1).await;
        session.give_sample(old_source.id, VideoArgs::skip(2).into_payload(), &rp);
        assert_eq!(old_sink.replies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replaced_topology_dropped_after_timeout() {
        let options = SessionOptions {
            drain_timeout: Duration::from_millis(20),
            drain_poll: Duration::from_millis(2),
        };
        let (session, mut events) = session(options);
        let (t1, _old_source, _old_sink) = pair();
        let (t2, _new_source, _new_sink) = pair();
        session.start_topology(&t1, 0).unwrap();
        session.switch_topology(&t2).unwrap();

        wait_torn_down(&t1).await;
        let mut timed_out = false;
        while let Ok(event) = events.try_recv() {
            timed_out |= matches!(event, SessionEvent::Error(PipelineError::DrainTimeout(_)));
        }
        assert!(timed_out);
        assert!(!t2.is_torn_down());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_non_fatal_error_keeps_session_usable() {
        let (session, mut events) = session(SessionOptions::default());
        let (topology, _source, _sink) = pair();
        session.report(PipelineError::Capture(anyhow::anyhow!("device lost")));
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Error(PipelineError::Capture(_)))
        ));
        assert!(!session.is_failed());
        session.start_topology(&topology, 0).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fatal_blocks_restart() {
        let (session, mut events) = session(SessionOptions::default());
        let (topology, _source, _sink) = pair();
        session.report(PipelineError::DuplicatePacket(3));
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Error(PipelineError::DuplicatePacket(3)))
        ));
        assert_eq!(session.state(), PipelineState::Failed);
        assert!(matches!(
            session.start_topology(&topology, 0),
            Err(PipelineError::InvalidState { .. })
        ));
    }
}
