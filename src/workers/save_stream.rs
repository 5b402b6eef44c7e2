use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::info;
use serde::Serialize;

use crate::pipeline::{OutputWriter, SampleView, TimeUnit};

#[derive(Debug, Serialize)]
struct SampleRecord<'a> {
    kind: &'a str,
    timestamp: TimeUnit,
    bytes: usize,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    video_samples: u64,
    audio_samples: u64,
    bytes: u64,
    first_timestamp: Option<TimeUnit>,
    last_timestamp: Option<TimeUnit>,
    finished_at: String,
}

#[derive(Debug, Serialize)]
struct SummaryRecord<'a> {
    summary: &'a Summary,
}

/// Recording writer: one JSON line per sample, then a summary line.
pub struct SaveStream {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    summary: Summary,
}

impl SaveStream {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create recording {}", path.display()))?;
        info!("Saving to {}", path.display());
        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
            summary: Summary::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputWriter for SaveStream {
    fn write_sample(&mut self, is_video: bool, sample: &SampleView<'_>) -> Result<()> {
        let out = self.out.as_mut().context("Recording already finalized")?;

        let timestamp = sample.timestamp();
        let bytes = sample.buffer().map_or(0, |b| b.len());
        let record = SampleRecord {
            kind: if is_video { "video" } else { "audio" },
            timestamp,
            bytes,
        };
        serde_json::to_writer(&mut *out, &record)?;
        out.write_all(b"\n")?;

        if is_video {
            self.summary.video_samples += 1;
        } else {
            self.summary.audio_samples += 1;
        }
        self.summary.bytes += bytes as u64;
        self.summary.first_timestamp.get_or_insert(timestamp);
        self.summary.last_timestamp = Some(timestamp);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };

        self.summary.finished_at = Local::now().to_rfc3339();
        serde_json::to_writer(&mut out, &SummaryRecord { summary: &self.summary })?;
        out.write_all(b"\n")?;
        out.flush()?;
        info!(
            "Recording {} closed: {} video, {} audio samples",
            self.path.display(),
            self.summary.video_samples,
            self.summary.audio_samples
        );
        Ok(())
    }
}
