//! Recorder coordinator
//!
//! Wires desktop capture (and optionally a silent audio track) into the file
//! sink, runs the session until asked to stop, and reacts to what the session
//! reports: broken sources are rebuilt by switching to a fresh topology, fatal
//! errors abort the recording.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capture::{
    DisplayCapture, DisplayCaptureOptions, FrameProducer, GenericFrameProducer, SilenceSource,
};
use crate::config::PipelineConfig;
use crate::pipeline::health::HealthSummary;
use crate::pipeline::{
    FileSink, HealthMonitor, MediaClock, MediaKind, PipelineHealth, Session, SessionEvent,
    SourceStream, Topology, TopologyRef, WorkQueue,
};
use crate::workers::SaveStream;

/// Rebuilds tried before a broken recording is stopped.
const MAX_REINIT_ATTEMPTS: u32 = 3;

/// Opens the frame producer behind each desktop capture source.
pub type ProducerFactory =
    Box<dyn Fn(&PipelineConfig) -> Result<Box<dyn FrameProducer>> + Send + Sync>;

fn generic_producer(config: &PipelineConfig) -> Result<Box<dyn FrameProducer>> {
    let producer = GenericFrameProducer::new(config.width, config.height, config.frame_rate)?;
    Ok(Box::new(producer))
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct Recorder {
    config: PipelineConfig,
    session: Arc<Session>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    sink: Arc<FileSink>,
    producers: ProducerFactory,
    reinit_attempts: u32,
    background: CancellationToken,
}

impl Recorder {
    /// Create the session and open the output. Must run inside a tokio
    /// runtime.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let clock = Arc::new(MediaClock::system());
        let health = Arc::new(PipelineHealth::new());
        let (session, events) =
            Session::new(clock, WorkQueue::current()?, health, config.session_options());

        let writer = SaveStream::create(&config.output)?;
        let sink = FileSink::new(&session, Box::new(writer), config.sink_options());

        Ok(Self {
            config,
            session,
            events,
            sink,
            producers: Box::new(generic_producer),
            reinit_attempts: 0,
            background: CancellationToken::new(),
        })
    }

    /// Capture through producers from `factory` instead of the built-in
    /// black frame generator.
    pub fn with_producers(mut self, factory: ProducerFactory) -> Self {
        self.producers = factory;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn health(&self) -> &Arc<PipelineHealth> {
        self.session.health()
    }

    /// Fresh sources connected to the sink.
    fn build_topology(&self) -> Result<TopologyRef> {
        let config = &self.config;
        let rate = config.frame_rate;
        let mut builder = Topology::builder();

        let producer = (self.producers)(config)?;
        let capture = DisplayCapture::create(
            &self.session,
            producer,
            DisplayCaptureOptions {
                frame_rate: rate,
                acquire_timeout: config.capture_timeout(),
            },
        );
        let video = builder.add_stream(SourceStream::new(&capture));
        let video_out = builder.add_stream(self.sink.create_stream(MediaKind::Video));
        builder.connect(video, video_out);

        if config.audio {
            let silence = SilenceSource::create(
                &self.session,
                rate,
                config.audio_sample_rate,
                config.audio_channels,
            );
            let audio = builder.add_stream(SourceStream::new(&silence));
            let audio_out = builder.add_stream(self.sink.create_stream(MediaKind::Audio));
            builder.connect(audio, audio_out);
        }

        Ok(builder.build())
    }

    fn spawn_health_tasks(&self) {
        let (alert_tx, mut alert_rx) = mpsc::channel(16);
        let monitor = HealthMonitor::new(self.health().clone(), alert_tx);
        let cancel = self.background.child_token();
        tokio::spawn(async move { monitor.run(cancel).await });
        tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                warn!("Pipeline health: {}", alert);
            }
        });

        let health = self.health().clone();
        let cancel = self.background.child_token();
        let period = Duration::from_secs(self.config.health_log_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => info!("Recorder pipeline: {}", health.summary()),
                }
            }
        });
    }

    /// Record until `stop` fires, the configured duration elapses or the
    /// pipeline fails, then drain and close the output.
    pub async fn run(mut self, stop: CancellationToken) -> Result<HealthSummary> {
        let topology = self.build_topology()?;
        self.session.start_topology(&topology, 0)?;
        self.spawn_health_tasks();
        info!(
            "Recording {}x{} at {} to {}",
            self.config.width,
            self.config.height,
            self.config.frame_rate,
            self.config.output.display()
        );

        let limit = self.config.duration();
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    info!("Stop requested");
                    break Ok(());
                }
                _ = &mut deadline => {
                    info!("Recording duration reached");
                    break Ok(());
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        break Err(anyhow!("session event channel closed"));
                    };
                    match self.handle_event(event) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        let result = match outcome {
            Ok(()) => self.drain().await,
            Err(e) => Err(e),
        };
        self.background.cancel();

        let summary = self.health().summary();
        info!("Recorder pipeline: {}", summary);
        result.map(|()| summary)
    }

    fn handle_event(&mut self, event: SessionEvent) -> Result<Flow> {
        match event {
            SessionEvent::Started { topology } => info!("Topology {} started", topology),
            SessionEvent::Switched { from, to } => info!("Switched topology {} -> {}", from, to),
            SessionEvent::ReinitializeRequested { component, name } => {
                if self.reinit_attempts >= MAX_REINIT_ATTEMPTS {
                    error!(
                        "{} ({:?}) broke again after {} rebuilds, stopping",
                        name, component, self.reinit_attempts
                    );
                    return Ok(Flow::Stop);
                }
                self.reinit_attempts += 1;
                warn!(
                    "Rebuilding sources for {} ({:?}), attempt {}",
                    name, component, self.reinit_attempts
                );
                let topology = self.build_topology()?;
                self.session.switch_topology(&topology)?;
            }
            SessionEvent::Stopped { topology } => {
                warn!("Topology {} stopped unexpectedly", topology);
                return Ok(Flow::Stop);
            }
            SessionEvent::Error(e) if e.is_fatal() => {
                error!("Recording failed: {}", e);
                self.session.abort();
                return Err(e.into());
            }
            SessionEvent::Error(e) => warn!("Recording degraded: {:#}", anyhow::Error::from(e)),
        }
        Ok(Flow::Continue)
    }

    /// Drain the live topology up to now and wait for it to stop.
    async fn drain(&mut self) -> Result<()> {
        if self.session.current_topology().is_none() {
            return Ok(());
        }
        let now = self.session.clock().get_current_time();
        self.session.stop_topology(now)?;

        let wait = self.config.session_options().drain_timeout + Duration::from_secs(1);
        let stopped = tokio::time::timeout(wait, async {
            while let Some(event) = self.events.recv().await {
                match event {
                    SessionEvent::Stopped { .. } => return Ok(()),
                    SessionEvent::Error(e) if e.is_fatal() => {
                        self.session.abort();
                        return Err(anyhow::Error::from(e));
                    }
                    SessionEvent::Error(e) => warn!("While draining: {}", e),
                    other => info!("Ignoring {:?} while draining", other),
                }
            }
            Err(anyhow!("session event channel closed"))
        })
        .await;

        match stopped {
            Ok(result) => result,
            Err(_) => {
                self.session.abort();
                Err(anyhow!("session did not stop within {:?}", wait))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::AcquireResult;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Producer whose device is gone.
    struct Unplugged;

    impl FrameProducer for Unplugged {
        fn acquire_next_frame(&mut self, _timeout: Duration) -> Result<AcquireResult> {
            Err(anyhow!("display disconnected"))
        }

        fn release_frame(&mut self) {}

        fn resolution(&self) -> (u32, u32) {
            (64, 36)
        }
    }

    /// Factory handing out `failing` unplugged producers, then working ones.
    fn flaky_producers(failing: usize, built: Arc<AtomicUsize>) -> ProducerFactory {
        Box::new(move |config| {
            if built.fetch_add(1, Ordering::SeqCst) < failing {
                Ok(Box::new(Unplugged))
            } else {
                generic_producer(config)
            }
        })
    }

    fn config(dir: &tempfile::TempDir) -> PipelineConfig {
        PipelineConfig {
            width: 64,
            height: 36,
            output: dir.path().join("out.jsonl"),
            duration_secs: None,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_records_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let output = config.output.clone();
        let recorder = Recorder::new(config).unwrap();

        let stop = CancellationToken::new();
        let run = tokio::spawn(recorder.run(stop.clone()));
        tokio::time::sleep(Duration::from_millis(400)).await;
        stop.cancel();

        let summary = run.await.unwrap().unwrap();
        assert!(summary.samples_written > 0);

        let text = std::fs::read_to_string(output).unwrap();
        let records: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        let last = records.last().unwrap();
        assert!(last.get("summary").is_some());
        assert!(records.iter().any(|r| r["kind"] == "video"));
        assert!(records.iter().any(|r| r["kind"] == "audio"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unwritable_output_fails_early() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output: dir.path().join("missing").join("out.jsonl"),
            ..config(&dir)
        };
        assert!(Recorder::new(config).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broken_capture_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let output = config.output.clone();
        let built = Arc::new(AtomicUsize::new(0));
        let recorder = Recorder::new(config)
            .unwrap()
            .with_producers(flaky_producers(1, built.clone()));
        let health = recorder.health().clone();

        let stop = CancellationToken::new();
        let run = tokio::spawn(recorder.run(stop.clone()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!run.is_finished());
        stop.cancel();

        let summary = run.await.unwrap().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(health.reinit_requests(), 1);
        assert!(summary.frames_captured > 0);

        let text = std::fs::read_to_string(output).unwrap();
        let records: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert!(records.iter().any(|r| r["kind"] == "video"));
        assert!(records.last().unwrap().get("summary").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gives_up_after_max_reinit_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let built = Arc::new(AtomicUsize::new(0));
        let recorder = Recorder::new(config(&dir))
            .unwrap()
            .with_producers(flaky_producers(usize::MAX, built.clone()));
        let health = recorder.health().clone();

        // Never cancelled: the recorder has to stop on its own.
        let summary = tokio::time::timeout(Duration::from_secs(5), recorder.run(CancellationToken::new()))
            .await
            .expect("recorder kept rebuilding")
            .unwrap();

        let attempts = MAX_REINIT_ATTEMPTS as usize;
        assert_eq!(built.load(Ordering::SeqCst), attempts + 1);
        assert_eq!(health.reinit_requests(), attempts as u64 + 1);
        assert_eq!(summary.frames_captured, 0);
    }
}
