use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::capture::MAX_FRAME_DIMENSION;
use crate::errors::{PipelineError, Result};
use crate::pipeline::{FrameRate, SessionOptions, SinkOptions};

/// Recorder settings. Every field has a default, so a config file only
/// names what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_rate: FrameRate,
    pub width: u32,
    pub height: u32,
    /// Defaults to one frame period
    pub capture_timeout_ms: Option<u64>,
    pub audio: bool,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// Treat non-increasing sample timestamps as fatal
    pub strict_timestamps: bool,
    pub drain_timeout_ms: u64,
    pub drain_poll_ms: u64,
    pub output: PathBuf,
    pub duration_secs: Option<u64>,
    pub health_log_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_rate: FrameRate::default(),
            width: 1920,
            height: 1080,
            capture_timeout_ms: None,
            audio: true,
            audio_sample_rate: 48_000,
            audio_channels: 2,
            strict_timestamps: false,
            drain_timeout_ms: 2_000,
            drain_poll_ms: 5,
            output: default_output(),
            duration_secs: None,
            health_log_secs: 30,
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(format!("capture-{}.jsonl", Local::now().format("%Y%m%d-%H%M%S")))
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.frame_rate.is_valid() {
            return Err(PipelineError::Config(format!(
                "invalid frame rate {}/{}",
                self.frame_rate.num, self.frame_rate.den
            )));
        }
        let side = 1..=MAX_FRAME_DIMENSION;
        if !side.contains(&self.width) || !side.contains(&self.height) {
            return Err(PipelineError::Config(format!(
                "invalid capture size {}x{}",
                self.width, self.height
            )));
        }
        if self.capture_timeout_ms == Some(0) || self.drain_timeout_ms == 0 || self.drain_poll_ms == 0 {
            return Err(PipelineError::Config("timeouts must be non-zero".into()));
        }
        if self.audio && (self.audio_sample_rate == 0 || self.audio_channels == 0) {
            return Err(PipelineError::Config("invalid audio format".into()));
        }
        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        self.capture_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.frame_rate.frame_interval())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            drain_poll: Duration::from_millis(self.drain_poll_ms),
        }
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            frame_rate: self.frame_rate,
            strict_timestamps: self.strict_timestamps,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
