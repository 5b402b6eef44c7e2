//! File sink: the request driver at the end of a topology
//!
//! [`FileSink`] is a clock-driven component. Once per frame period it issues
//! a request on each of its streams, numbered from a per-direction counter
//! that keeps running across topology switches. Replies come back through
//! [`FileSinkStream::process_sample`] in completion order, are reordered by
//! packet number and handed to the [`OutputWriter`] strictly in order.
//!
//! Stopping: when the session sets a drain time, the next period issues a
//! `DRAIN` request at that time instead and the sink stops rescheduling. A
//! stream that is stopped by a topology switch issues a `LAST_PACKET`
//! request on its old topology instead; the session keeps that topology
//! routed until the answer has been consumed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, error, trace, warn};
use parking_lot::Mutex;

use crate::errors::PipelineError;

use super::clock_sink::{ClockSink, Schedulable};
use super::health::PipelineHealth;
use super::message_generator::{ComponentKey, StreamListener};
use super::request_queue::{Request, RequestQueue};
use super::sample::{LockMode, SampleRef, SampleView};
use super::session::Session;
use super::source::ServeGate;
use super::topology::{MediaStream, StreamId, Topology};
use super::types::{FrameRate, MediaKind, Payload, RequestFlags, RequestPacket, TimeUnit};

/// Destination of written samples, e.g. a muxer or a sample log.
pub trait OutputWriter: Send {
    /// Write one sample. Called in packet order per direction.
    fn write_sample(&mut self, is_video: bool, sample: &SampleView<'_>) -> anyhow::Result<()>;

    /// Flush and close. Called once when the sink stops.
    fn finalize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SinkOptions {
    pub frame_rate: FrameRate,
    /// Treat a non-increasing output timestamp as fatal instead of logging.
    pub strict_timestamps: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            frame_rate: FrameRate::default(),
            strict_timestamps: false,
        }
    }
}

type SinkRequest = Request<StreamId, Payload>;

fn direction(kind: MediaKind) -> usize {
    match kind {
        MediaKind::Video => 0,
        MediaKind::Audio => 1,
    }
}

pub struct FileSink {
    key: ComponentKey,
    session: Weak<Session>,
    health: Arc<PipelineHealth>,
    options: SinkOptions,
    clock_sink: ClockSink,
    writer: Mutex<Box<dyn OutputWriter>>,
    next_packet: [AtomicU64; 2],
    streams: Mutex<Vec<Weak<FileSinkStream>>>,
    last_written: Mutex<[Option<TimeUnit>; 2]>,
    failed: AtomicBool,
}

impl FileSink {
    pub fn new(session: &Arc<Session>, writer: Box<dyn OutputWriter>, options: SinkOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let target: Weak<dyn Schedulable> = weak.clone();
            Self {
                key: ComponentKey::next(),
                session: Arc::downgrade(session),
                health: session.health().clone(),
                options,
                clock_sink: ClockSink::new(
                    session.clock(),
                    session.work_queue().clone(),
                    target,
                    session.health().clone(),
                ),
                writer: Mutex::new(writer),
                next_packet: [AtomicU64::new(0), AtomicU64::new(0)],
                streams: Mutex::new(Vec::new()),
                last_written: Mutex::new([None, None]),
                failed: AtomicBool::new(false),
            }
        })
    }

    /// New stream of this sink, for one topology.
    pub fn create_stream(self: &Arc<Self>, kind: MediaKind) -> Arc<FileSinkStream> {
        Arc::new_cyclic(|weak| FileSinkStream {
            id: StreamId::next(),
            kind,
            sink: self.clone(),
            topology: Mutex::new(Weak::new()),
            requests: Mutex::new(RequestQueue::new()),
            gate: ServeGate::default(),
            ended: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            weak_self: weak.clone(),
        })
    }

    pub fn key(&self) -> ComponentKey {
        self.key
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn schedule_after(&self, time: TimeUnit) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let rate = self.options.frame_rate;
        let now = session.clock().get_current_time();
        let mut next = rate.to_time(rate.to_frame(time) + 1);
        if next <= now {
            next = rate.to_time(rate.to_frame(now) + 1);
        }
        if !self.clock_sink.schedule_new_callback(next) {
            debug!("File sink could not schedule {}", next);
        }
    }

    fn issue(&self, stream: &FileSinkStream, request_time: TimeUnit, flags: RequestFlags) {
        let ends = flags.contains(RequestFlags::DRAIN) || flags.contains(RequestFlags::LAST_PACKET);
        if ends {
            if stream.ended.swap(true, Ordering::AcqRel) {
                return;
            }
        } else if stream.ended.load(Ordering::Acquire) {
            return;
        }

        let Some(session) = self.session.upgrade() else {
            return;
        };
        let Some(topology) = stream.topology.lock().upgrade() else {
            return;
        };

        let packet_number = self.next_packet[direction(stream.kind)].fetch_add(1, Ordering::AcqRel);
        let rp = RequestPacket {
            topology,
            flags,
            request_time,
            timestamp: session.clock().get_current_time(),
            packet_number,
        };
        trace!("{} requesting {:?}", stream.id, rp);
        stream.requests.lock().ensure_open(packet_number);
        session.request_sample(stream.id, &rp);
    }

    fn attached_streams(&self) -> Vec<Arc<FileSinkStream>> {
        let mut streams = self.streams.lock();
        streams.retain(|s| s.strong_count() > 0);
        streams.iter().filter_map(Weak::upgrade).collect()
    }

    fn write(&self, kind: MediaKind, sample: &SampleRef) {
        let view = SampleView::new(sample, LockMode::Read);
        let timestamp = view.timestamp();

        {
            let mut last = self.last_written.lock();
            let index = direction(kind);
            let last_timestamp = last[index];
            match last_timestamp {
                Some(previous) if timestamp <= previous => {
                    if self.options.strict_timestamps {
                        drop(last);
                        drop(view);
                        self.fail(PipelineError::OrderingViolation {
                            previous,
                            current: timestamp,
                        });
                        return;
                    }
                    warn!("{} timestamp {} does not follow {}", kind, timestamp, previous);
                    self.health.record_reorder_warning();
                }
                _ => last[index] = Some(timestamp),
            }
        }

        let size = view.buffer().map_or(0, |buffer| buffer.len());
        let result = self
            .writer
            .lock()
            .write_sample(kind == MediaKind::Video, &view);
        drop(view);

        match result {
            Ok(()) => self.health.record_sample_written(size),
            Err(e) => self.fail(PipelineError::Writer(e)),
        }
    }

    fn fail(&self, err: PipelineError) {
        if self.failed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clock_sink.clear_queue();
        if let Some(session) = self.session.upgrade() {
            session.report(err);
        }
    }

    fn component_start(&self, time: TimeUnit) {
        debug!("File sink starting at {}", time);
        self.schedule_after(time);
    }

    fn component_stop(&self, time: TimeUnit) {
        debug!("File sink stopping at {}", time);
        self.clock_sink.clear_queue();
        if let Err(e) = self.writer.lock().finalize() {
            error!("Failed to finalize output: {:#}", e);
            self.fail(PipelineError::Writer(e));
        }
    }
}

impl Schedulable for FileSink {
    fn scheduled_callback(&self, due_time: TimeUnit) {
        if self.is_failed() {
            return;
        }
        let drain_time = self.session.upgrade().and_then(|s| s.drain_time());

        let (request_time, flags) = match drain_time {
            Some(drain) if due_time >= drain => (drain, RequestFlags::DRAIN),
            _ => (due_time, RequestFlags::NONE),
        };

        for stream in self.attached_streams() {
            self.issue(&stream, request_time, flags);
        }

        if flags == RequestFlags::NONE {
            self.schedule_after(due_time);
        }
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("key", &self.key)
            .field("clock_sink", &self.clock_sink)
            .field("failed", &self.is_failed())
            .finish()
    }
}

/// One direction of a [`FileSink`] in one topology.
pub struct FileSinkStream {
    id: StreamId,
    kind: MediaKind,
    sink: Arc<FileSink>,
    topology: Mutex<Weak<Topology>>,
    requests: Mutex<RequestQueue<SinkRequest>>,
    gate: ServeGate,
    /// The final request of this stream has been issued.
    ended: AtomicBool,
    /// The final request of this stream has been consumed.
    drained: AtomicBool,
    weak_self: Weak<Self>,
}

impl FileSinkStream {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    fn serve(&self) {
        self.gate.run(&self.sink.health, || self.serve_pending());
    }

    fn serve_pending(&self) {
        loop {
            let Some(entry) = self.requests.lock().pop() else {
                break;
            };

            if !self.sink.is_failed() {
                if let Some(sample) = entry.payload.as_ref().and_then(Payload::sample) {
                    self.sink.write(self.kind, sample);
                }
            }

            if entry.rp.ends_topology() {
                debug!("{} consumed its final packet {}", self.id, entry.rp.packet_number);
                self.drained.store(true, Ordering::Release);
            }
        }
    }
}

impl StreamListener for FileSinkStream {
    fn on_component_start(&self, time: TimeUnit) {
        self.sink.component_start(time);
    }

    fn on_component_stop(&self, time: TimeUnit) {
        self.sink.component_stop(time);
    }

    fn on_stream_start(&self, _time: TimeUnit) {
        self.sink.streams.lock().push(self.weak_self.clone());
    }

    fn on_stream_stop(&self, time: TimeUnit) {
        self.sink
            .streams
            .lock()
            .retain(|s| s.strong_count() > 0 && !s.ptr_eq(&self.weak_self));
        // Stopped by a switch rather than a drain.
        self.sink.issue(self, time, RequestFlags::LAST_PACKET);
    }

    fn is_drainable_or_drained(&self, _drain_time: TimeUnit) -> bool {
        self.is_drained() || self.sink.is_failed()
    }
}

impl MediaStream for FileSinkStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn component_key(&self) -> ComponentKey {
        self.sink.key
    }

    fn media_kind(&self) -> Option<MediaKind> {
        Some(self.kind)
    }

    fn attach_topology(&self, topology: Weak<Topology>) {
        *self.topology.lock() = topology;
    }

    fn request_sample(&self, rp: &RequestPacket) {
        trace!("{} is a sink, ignoring request {}", self.id, rp.packet_number);
    }

    fn process_sample(&self, prev: Option<StreamId>, payload: Option<Payload>, rp: &RequestPacket) {
        let entry = SinkRequest {
            stream: self.id,
            prev_stream: prev,
            rp: rp.clone(),
            payload,
        };
        let pushed = self.requests.lock().push(entry);
        if let Err(e) = pushed {
            self.sink.fail(e);
            return;
        }
        self.serve();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::{ManualTimeSource, MediaClock};
    use crate::pipeline::executor::WorkQueue;
    use crate::pipeline::sample::Sample;
    use crate::pipeline::session::{SessionEvent, SessionOptions};
    use crate::pipeline::source::{SourceBase, SourceImpl, SourceRequest, SourceStream};
    use crate::pipeline::topology::TopologyRef;
    use crate::pipeline::types::{FrameNumber, SourceArgs, VideoArgs};
    use bytes::Bytes;
    use std::sync::atomic::AtomicI64;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Written {
        samples: Vec<(bool, TimeUnit)>,
        finalized: bool,
    }

    struct MemoryWriter {
        written: Arc<Mutex<Written>>,
        fail_after: Option<usize>,
    }

    impl OutputWriter for MemoryWriter {
        fn write_sample(&mut self, is_video: bool, sample: &SampleView<'_>) -> anyhow::Result<()> {
            let mut written = self.written.lock();
            if self.fail_after == Some(written.samples.len()) {
                anyhow::bail!("disk full");
            }
            written.samples.push((is_video, sample.timestamp()));
            Ok(())
        }

        fn finalize(&mut self) -> anyhow::Result<()> {
            self.written.lock().finalized = true;
            Ok(())
        }
    }

    /// Upstream stand-in that never answers on its own.
    struct Silent {
        id: StreamId,
        key: ComponentKey,
    }

    impl StreamListener for Silent {}

    impl MediaStream for Silent {
        fn id(&self) -> StreamId {
            self.id
        }

        fn component_key(&self) -> ComponentKey {
            self.key
        }

        fn request_sample(&self, _rp: &RequestPacket) {}

        fn process_sample(&self, _prev: Option<StreamId>, _payload: Option<Payload>, _rp: &RequestPacket) {}
    }

    struct Fixture {
        session: Arc<Session>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        written: Arc<Mutex<Written>>,
        topology: TopologyRef,
        upstream: StreamId,
        stream: Arc<FileSinkStream>,
    }

    fn fixture(strict_timestamps: bool, fail_after: Option<usize>) -> Fixture {
        let clock = Arc::new(MediaClock::new(Arc::new(ManualTimeSource::new())));
        let (session, events) = Session::new(
            clock,
            WorkQueue::current().unwrap(),
            Arc::new(PipelineHealth::new()),
            SessionOptions::default(),
        );
        let written = Arc::new(Mutex::new(Written::default()));
        let sink = FileSink::new(
            &session,
            Box::new(MemoryWriter {
                written: written.clone(),
                fail_after,
            }),
            SinkOptions {
                frame_rate: FrameRate::new(30, 1),
                strict_timestamps,
            },
        );
        let stream = sink.create_stream(MediaKind::Video);
        let mut builder = Topology::builder();
        let upstream = builder.add_stream(Arc::new(Silent {
            id: StreamId::next(),
            key: ComponentKey::next(),
        }));
        let down = builder.add_stream(stream.clone());
        builder.connect(upstream, down);
        // As if packet 0 had been issued.
        stream.requests.lock().ensure_open(0);
        Fixture {
            session,
            events,
            written,
            topology: builder.build(),
            upstream,
            stream,
        }
    }

    impl Fixture {
        fn reply(&self, packet_number: u64, timestamp: Option<TimeUnit>, flags: RequestFlags) {
            let sample = timestamp.map(|ts| Arc::new(Sample::new(ts, Some(Bytes::from_static(b"px")))));
            let rp = RequestPacket {
                topology: self.topology.clone(),
                flags,
                request_time: 0,
                timestamp: 0,
                packet_number,
            };
            let payload = Payload::Video(VideoArgs { sample, frame_end: 0 });
            self.stream.process_sample(Some(self.upstream), Some(payload), &rp);
        }

        fn timestamps(&self) -> Vec<TimeUnit> {
            self.written.lock().samples.iter().map(|(_, ts)| *ts).collect()
        }

        fn reported_error(&mut self) -> Option<PipelineError> {
            while let Ok(event) = self.events.try_recv() {
                if let SessionEvent::Error(err) = event {
                    return Some(err);
                }
            }
            None
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writes_in_packet_order() {
        let f = fixture(false, None);
        f.reply(2, Some(300), RequestFlags::NONE);
        f.reply(0, Some(100), RequestFlags::NONE);
        assert_eq!(f.timestamps(), vec![100]);

        // A skip reply carries no sample but still advances the order.
        f.reply(1, None, RequestFlags::NONE);
        assert_eq!(f.timestamps(), vec![100, 300]);
        assert_eq!(f.session.health().samples_written(), 2);
        assert_eq!(f.session.health().bytes_written(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_non_increasing_timestamp_is_logged() {
        let mut f = fixture(false, None);
        f.reply(0, Some(100), RequestFlags::NONE);
        f.reply(1, Some(100), RequestFlags::NONE);
        f.reply(2, Some(200), RequestFlags::NONE);

        assert_eq!(f.timestamps(), vec![100, 100, 200]);
        assert_eq!(f.session.health().reorder_warnings(), 1);
        assert!(f.reported_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_strict_mode_rejects_reordering() {
        let mut f = fixture(true, None);
        f.reply(0, Some(200), RequestFlags::NONE);
        f.reply(1, Some(150), RequestFlags::NONE);
        f.reply(2, Some(300), RequestFlags::NONE);

        assert_eq!(f.timestamps(), vec![200]);
        assert!(matches!(
            f.reported_error(),
            Some(PipelineError::OrderingViolation {
                previous: 200,
                current: 150
            })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writer_failure_is_fatal_once() {
        let mut f = fixture(false, Some(1));
        f.reply(0, Some(100), RequestFlags::NONE);
        f.reply(1, Some(200), RequestFlags::NONE);
        f.reply(2, Some(300), RequestFlags::NONE);

        assert_eq!(f.timestamps(), vec![100]);
        assert!(matches!(f.reported_error(), Some(PipelineError::Writer(_))));
        assert!(f.reported_error().is_none());
        assert!(f.session.is_failed());
        // A failed sink never holds up a drain.
        assert!(f.stream.is_drainable_or_drained(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drained_after_final_packet() {
        let f = fixture(false, None);
        f.reply(0, Some(100), RequestFlags::NONE);
        assert!(!f.stream.is_drainable_or_drained(0));
        f.reply(1, None, RequestFlags::DRAIN);
        assert!(f.stream.is_drainable_or_drained(0));
    }

    /// Source that has data up to the current clock frame and emits one
    /// sample per new frame.
    struct Clocked {
        clock: Arc<MediaClock>,
        rate: FrameRate,
        last: AtomicI64,
    }

    impl SourceImpl for Clocked {
        type Args = VideoArgs;
        const KIND: MediaKind = MediaKind::Video;

        fn name(&self) -> &str {
            "clocked"
        }

        fn samples_end(&self) -> Option<FrameNumber> {
            Some(self.rate.to_frame(self.clock.get_current_time()))
        }

        fn make_request(
            &self,
            _request: &SourceRequest<Self>,
            frame_end: FrameNumber,
        ) -> anyhow::Result<VideoArgs> {
            if self.last.fetch_max(frame_end, Ordering::SeqCst) >= frame_end {
                return Ok(VideoArgs::skip(frame_end));
            }
            let sample = Arc::new(Sample::new(self.rate.to_time(frame_end), None));
            Ok(VideoArgs {
                sample: Some(sample),
                frame_end,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clock_driven_recording_drains() {
        let rate = FrameRate::new(30, 1);
        let clock = Arc::new(MediaClock::system());
        let (session, mut events) = Session::new(
            clock.clone(),
            WorkQueue::current().unwrap(),
            Arc::new(PipelineHealth::new()),
            SessionOptions::default(),
        );
        let written = Arc::new(Mutex::new(Written::default()));
        let sink = FileSink::new(
            &session,
            Box::new(MemoryWriter {
                written: written.clone(),
                fail_after: None,
            }),
            SinkOptions {
                frame_rate: rate,
                strict_timestamps: true,
            },
        );
        let source = SourceBase::new_cyclic(&session, rate, |_| Clocked {
            clock: clock.clone(),
            rate,
            last: AtomicI64::new(-1),
        });

        let mut builder = Topology::builder();
        let up = builder.add_stream(SourceStream::new(&source));
        let down = builder.add_stream(sink.create_stream(MediaKind::Video));
        builder.connect(up, down);
        let topology = builder.build();

        session.start_topology(&topology, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        session.stop_topology(clock.get_current_time()).unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(3), async {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Stopped { .. } => return true,
                    SessionEvent::Error(err) => panic!("unexpected error: {err}"),
                    _ => {}
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(stopped);

        let written = written.lock();
        assert!(written.finalized);
        assert!(written.samples.len() >= 3);
        assert!(written.samples.windows(2).all(|w| w[0].1 < w[1].1));
        assert_eq!(session.health().reorder_warnings(), 0);
        assert!(topology.is_torn_down());
    }

    /// Source that has data up to the current clock frame and stamps each
    /// answer with the packet number it answers.
    struct Numbered {
        clock: Arc<MediaClock>,
        rate: FrameRate,
    }

    impl SourceImpl for Numbered {
        type Args = VideoArgs;
        const KIND: MediaKind = MediaKind::Video;

        fn name(&self) -> &str {
            "numbered"
        }

        fn samples_end(&self) -> Option<FrameNumber> {
            Some(self.rate.to_frame(self.clock.get_current_time()))
        }

        fn make_request(
            &self,
            request: &SourceRequest<Self>,
            frame_end: FrameNumber,
        ) -> anyhow::Result<VideoArgs> {
            let sample = Arc::new(Sample::new(request.rp.packet_number as TimeUnit, None));
            Ok(VideoArgs {
                sample: Some(sample),
                frame_end,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_switch_keeps_packet_sequence_contiguous() {
        let rate = FrameRate::new(30, 1);
        let clock = Arc::new(MediaClock::system());
        let (session, mut events) = Session::new(
            clock.clone(),
            WorkQueue::current().unwrap(),
            Arc::new(PipelineHealth::new()),
            SessionOptions::default(),
        );
        let written = Arc::new(Mutex::new(Written::default()));
        let sink = FileSink::new(
            &session,
            Box::new(MemoryWriter {
                written: written.clone(),
                fail_after: None,
            }),
            SinkOptions {
                frame_rate: rate,
                strict_timestamps: false,
            },
        );
        let source = SourceBase::new_cyclic(&session, rate, |_| Numbered {
            clock: clock.clone(),
            rate,
        });

        let build = || {
            let sink_stream = sink.create_stream(MediaKind::Video);
            let mut builder = Topology::builder();
            let up = builder.add_stream(SourceStream::new(&source));
            let down = builder.add_stream(sink_stream.clone());
            builder.connect(up, down);
            (builder.build(), sink_stream)
        };
        let (first, first_sink) = build();
        let (second, _second_sink) = build();

        session.start_topology(&first, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        session.switch_topology(&second).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The old stream got the answer to its final packet before the
        // replaced topology was torn down.
        assert!(first_sink.is_drained());
        assert!(first.is_torn_down());
        assert!(!written.lock().finalized);

        session.stop_topology(clock.get_current_time()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(3), async {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Stopped { .. } => return true,
                    SessionEvent::Error(err) => panic!("unexpected error: {err}"),
                    _ => {}
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(stopped);

        let written = written.lock();
        assert!(written.finalized);
        let mut packets: Vec<TimeUnit> = written.samples.iter().map(|(_, ts)| *ts).collect();
        packets.sort_unstable();
        let expected: Vec<TimeUnit> = (0..packets.len() as TimeUnit).collect();
        assert_eq!(packets, expected);
        assert!(packets.len() >= 4);
        assert_eq!(source.active_topology_count(), 0);
    }
}
