//! Silent audio track
//!
//! Keeps an audio stream present in recordings made without an audio
//! device. Data is available up to the current clock time, and every
//! request is answered with zeroed s16 PCM covering the frames since the
//! previous answer.

use std::sync::Arc;

use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;

use crate::pipeline::types::SECOND_IN_TIME_UNIT;
use crate::pipeline::{
    AudioArgs, FrameNumber, FrameRate, MediaClock, MediaKind, Sample, Session, SourceArgs,
    SourceBase, SourceImpl, SourceRequest, TimeUnit,
};

const BYTES_PER_SAMPLE: usize = 2;

pub struct SilenceSource {
    clock: Arc<MediaClock>,
    frame_rate: FrameRate,
    sample_rate: u32,
    channels: u16,
    /// Frame boundary the previous answer ended at
    last_end: Mutex<Option<FrameNumber>>,
}

impl SilenceSource {
    pub fn create(
        session: &Arc<Session>,
        frame_rate: FrameRate,
        sample_rate: u32,
        channels: u16,
    ) -> Arc<SourceBase<Self>> {
        SourceBase::new_cyclic(session, frame_rate, |_| Self {
            clock: session.clock().clone(),
            frame_rate,
            sample_rate,
            channels,
            last_end: Mutex::new(None),
        })
    }

    /// PCM frames from time zero up to `time`, rounded down.
    fn samples_at(&self, time: TimeUnit) -> i64 {
        let samples = time as i128 * self.sample_rate as i128 / SECOND_IN_TIME_UNIT as i128;
        samples as i64
    }
}

impl SourceImpl for SilenceSource {
    type Args = AudioArgs;

    const KIND: MediaKind = MediaKind::Audio;

    fn name(&self) -> &str {
        "silence"
    }

    fn samples_end(&self) -> Option<FrameNumber> {
        Some(self.frame_rate.to_frame(self.clock.get_current_time()))
    }

    fn make_request(
        &self,
        _request: &SourceRequest<Self>,
        frame_end: FrameNumber,
    ) -> anyhow::Result<AudioArgs> {
        let mut last_end = self.last_end.lock();
        let start = last_end.unwrap_or(frame_end);
        if frame_end <= start {
            *last_end = Some(start.max(frame_end));
            return Ok(AudioArgs::skip(frame_end));
        }

        let start_time = self.frame_rate.to_time(start);
        let count = self.samples_at(self.frame_rate.to_time(frame_end)) - self.samples_at(start_time);
        let count = u32::try_from(count)?;
        *last_end = Some(frame_end);

        if count == 0 {
            return Ok(AudioArgs::skip(frame_end));
        }

        let size = count as usize * self.channels as usize * BYTES_PER_SAMPLE;
        let sample = Arc::new(Sample::new(start_time, Some(Bytes::from(vec![0u8; size]))));
        Ok(AudioArgs {
            sample: Some(sample),
            frame_end,
            sample_count: count,
        })
    }

    fn on_component_start(&self, _base: &SourceBase<Self>, time: TimeUnit) -> anyhow::Result<()> {
        let frame = self.frame_rate.to_frame(time);
        debug!(
            "Silence at {} Hz x{} from frame {}",
            self.sample_rate, self.channels, frame
        );
        *self.last_end.lock() = Some(frame);
        Ok(())
    }
}
