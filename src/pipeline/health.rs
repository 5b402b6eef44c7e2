//! Health monitoring and metrics for pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn unix_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Health metrics for a pipeline
///
/// Tracks the expected, non-escalated events of the pipeline (dropped frames,
/// missed deadlines, re-entrant serve calls) next to throughput counters.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Samples handed to the output writer
    pub samples_written: AtomicU64,

    /// Bytes handed to the output writer
    pub bytes_written: AtomicU64,

    /// Timestamp (as Unix microseconds) of the last written sample
    pub last_sample_time: AtomicU64,

    /// Hardware frames acquired and published downstream
    pub frames_captured: AtomicU64,

    /// Frames dropped because the consumer still held the previous buffer
    pub frame_drops: AtomicU64,

    /// Frame acquisitions that timed out
    pub capture_timeouts: AtomicU64,

    /// Replies synthesized by broken sources
    pub skip_frames: AtomicU64,

    /// Scheduled callbacks whose due time had already passed
    pub missed_deadlines: AtomicU64,

    /// Serve calls that found another server active
    pub serve_reentries: AtomicU64,

    /// Non-increasing output timestamps
    pub reorder_warnings: AtomicU64,

    /// Reinitialization requests raised by broken sources
    pub reinit_requests: AtomicU64,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            samples_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            last_sample_time: AtomicU64::new(unix_micros()),
            frames_captured: AtomicU64::new(0),
            frame_drops: AtomicU64::new(0),
            capture_timeouts: AtomicU64::new(0),
            skip_frames: AtomicU64::new(0),
            missed_deadlines: AtomicU64::new(0),
            serve_reentries: AtomicU64::new(0),
            reorder_warnings: AtomicU64::new(0),
            reinit_requests: AtomicU64::new(0),
        }
    }

    /// Record a sample handed to the writer
    pub fn record_sample_written(&self, size: usize) {
        self.last_sample_time.store(unix_micros(), Ordering::Relaxed);
        self.samples_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame dropped by backpressure
    pub fn record_frame_drop(&self) {
        self.frame_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_timeout(&self) {
        self.capture_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip_frame(&self) {
        self.skip_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missed_deadline(&self) {
        self.missed_deadlines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serve_reentry(&self) {
        self.serve_reentries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reorder_warning(&self) {
        self.reorder_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reinit_request(&self) {
        self.reinit_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn frame_drops(&self) -> u64 {
        self.frame_drops.load(Ordering::Relaxed)
    }

    pub fn capture_timeouts(&self) -> u64 {
        self.capture_timeouts.load(Ordering::Relaxed)
    }

    pub fn skip_frames(&self) -> u64 {
        self.skip_frames.load(Ordering::Relaxed)
    }

    pub fn missed_deadlines(&self) -> u64 {
        self.missed_deadlines.load(Ordering::Relaxed)
    }

    pub fn serve_reentries(&self) -> u64 {
        self.serve_reentries.load(Ordering::Relaxed)
    }

    pub fn reorder_warnings(&self) -> u64 {
        self.reorder_warnings.load(Ordering::Relaxed)
    }

    pub fn reinit_requests(&self) -> u64 {
        self.reinit_requests.load(Ordering::Relaxed)
    }

    /// Get the timestamp of the last written sample (Unix microseconds)
    pub fn last_sample_time(&self) -> u64 {
        self.last_sample_time.load(Ordering::Relaxed)
    }

    /// Dropped frames as a percentage of acquired frames
    pub fn frame_drop_rate(&self) -> f64 {
        let drops = self.frame_drops();
        let attempted = self.frames_captured() + drops;
        if attempted == 0 {
            return 0.0;
        }
        (drops as f64 / attempted as f64) * 100.0
    }

    /// Check if the pipeline has stalled (no sample written for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let elapsed_micros = unix_micros().saturating_sub(self.last_sample_time());
        elapsed_micros > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            samples_written: self.samples_written(),
            bytes_written: self.bytes_written(),
            frames_captured: self.frames_captured(),
            frame_drops: self.frame_drops(),
            frame_drop_rate: self.frame_drop_rate(),
            capture_timeouts: self.capture_timeouts(),
            skip_frames: self.skip_frames(),
            missed_deadlines: self.missed_deadlines(),
            serve_reentries: self.serve_reentries(),
            reorder_warnings: self.reorder_warnings(),
            reinit_requests: self.reinit_requests(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub samples_written: u64,
    pub bytes_written: u64,
    pub frames_captured: u64,
    pub frame_drops: u64,
    pub frame_drop_rate: f64,
    pub capture_timeouts: u64,
    pub skip_frames: u64,
    pub missed_deadlines: u64,
    pub serve_reentries: u64,
    pub reorder_warnings: u64,
    pub reinit_requests: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} samples ({} bytes), {} frames captured ({} drops, {:.2}%), {} capture timeouts, {} skip frames, {} missed deadlines, {} serve re-entries, {} reorder warnings, {} reinit requests",
            self.samples_written,
            self.bytes_written,
            self.frames_captured,
            self.frame_drops,
            self.frame_drop_rate,
            self.capture_timeouts,
            self.skip_frames,
            self.missed_deadlines,
            self.serve_reentries,
            self.reorder_warnings,
            self.reinit_requests
        )
    }
}

/// Health alert types
#[derive(Debug, Clone)]
pub enum HealthAlert {
    /// No sample written for the threshold duration
    Stalled { duration: Duration },

    /// High frame drop rate detected
    HighDropRate { rate: f64 },

    /// Scheduled callbacks fired after their deadline
    MissedDeadlines { count: u64 },

    /// Output timestamps went backwards
    ReorderWarnings { count: u64 },

    /// A broken source is feeding skip frames
    SkipFrames { count: u64 },
}

impl std::fmt::Display for HealthAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthAlert::Stalled { duration } => {
                write!(f, "Pipeline stalled for {:?}", duration)
            }
            HealthAlert::HighDropRate { rate } => {
                write!(f, "High frame drop rate: {:.2}%", rate)
            }
            HealthAlert::MissedDeadlines { count } => {
                write!(f, "Missed deadlines: {}", count)
            }
            HealthAlert::ReorderWarnings { count } => {
                write!(f, "Out-of-order output timestamps: {}", count)
            }
            HealthAlert::SkipFrames { count } => {
                write!(f, "Skip frames synthesized: {}", count)
            }
        }
    }
}

/// Health monitoring service
///
/// Periodically checks pipeline health and sends alerts when issues are detected.
pub struct HealthMonitor {
    health: Arc<PipelineHealth>,
    alert_tx: mpsc::Sender<HealthAlert>,
    check_interval: Duration,
    stall_threshold: Duration,
    drop_rate_threshold: f64,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(health: Arc<PipelineHealth>, alert_tx: mpsc::Sender<HealthAlert>) -> Self {
        Self {
            health,
            alert_tx,
            check_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(5),
            drop_rate_threshold: 10.0, // 10% drop rate
        }
    }

    /// Configure the check interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Configure the stall threshold
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Configure the drop rate threshold
    pub fn with_drop_rate_threshold(mut self, threshold: f64) -> Self {
        self.drop_rate_threshold = threshold;
        self
    }

    /// Run the health monitor until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        let mut last_missed = 0u64;
        let mut last_reorders = 0u64;
        let mut last_skips = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let mut alerts = Vec::new();

            if self.health.is_stalled(self.stall_threshold) {
                alerts.push(HealthAlert::Stalled {
                    duration: self.stall_threshold,
                });
            }

            let drop_rate = self.health.frame_drop_rate();
            if drop_rate > self.drop_rate_threshold {
                alerts.push(HealthAlert::HighDropRate { rate: drop_rate });
            }

            let missed = self.health.missed_deadlines();
            if missed > last_missed {
                alerts.push(HealthAlert::MissedDeadlines {
                    count: missed - last_missed,
                });
                last_missed = missed;
            }

            let reorders = self.health.reorder_warnings();
            if reorders > last_reorders {
                alerts.push(HealthAlert::ReorderWarnings {
                    count: reorders - last_reorders,
                });
                last_reorders = reorders;
            }

            let skips = self.health.skip_frames();
            if skips > last_skips {
                alerts.push(HealthAlert::SkipFrames {
                    count: skips - last_skips,
                });
                last_skips = skips;
            }

            for alert in alerts {
                if self.alert_tx.send(alert).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_metrics() {
        let health = PipelineHealth::new();

        health.record_sample_written(1000);
        health.record_sample_written(2000);
        health.record_frame_captured();
        health.record_frame_captured();
        health.record_frame_captured();

        assert_eq!(health.samples_written(), 2);
        assert_eq!(health.bytes_written(), 3000);
        assert_eq!(health.frame_drops(), 0);

        health.record_frame_drop();
        assert_eq!(health.frame_drops(), 1);
        assert!((health.frame_drop_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stall_detection() {
        let health = PipelineHealth::new();
        assert!(!health.is_stalled(Duration::from_secs(1)));

        health.record_sample_written(10);
        std::thread::sleep(Duration::from_millis(150));
        assert!(health.is_stalled(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_monitor_reports_new_events_once() {
        let health = Arc::new(PipelineHealth::new());
        let (tx, mut rx) = mpsc::channel(16);
        let monitor = HealthMonitor::new(health.clone(), tx)
            .with_check_interval(Duration::from_millis(10))
            .with_stall_threshold(Duration::from_secs(60));

        health.record_missed_deadline();
        health.record_missed_deadline();

        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run(cancel).await })
        };

        let alert = rx.recv().await.unwrap();
        assert!(matches!(alert, HealthAlert::MissedDeadlines { count: 2 }));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }
}
