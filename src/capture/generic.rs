use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use bytes::Bytes;

use crate::capture::{AcquireResult, CapturedFrame, FrameProducer};
use crate::pipeline::FrameRate;
use crate::pipeline::types::time_unit_from_duration;

/// Largest accepted frame side, in pixels.
pub const MAX_FRAME_DIMENSION: u32 = 16_384;

/// Frame producer for hosts without a capture backend.
///
/// Hands out black NV12 frames paced at the configured rate, with the same
/// acquire/release contract as a hardware producer.
pub struct GenericFrameProducer {
    width: u32,
    height: u32,
    frame: Bytes,
    interval: Duration,
    started: Instant,
    next_frame_at: Instant,
    holding: bool,
}

impl GenericFrameProducer {
    pub fn new(width: u32, height: u32, frame_rate: FrameRate) -> Result<Self> {
        if width == 0 || height == 0 || width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
            return Err(anyhow!("Invalid capture size {}x{}", width, height));
        }
        if !frame_rate.is_valid() {
            return Err(anyhow!("Invalid frame rate {}", frame_rate));
        }

        let (w, h) = (width + (width % 2), height + (height % 2));
        let now = Instant::now();
        Ok(Self {
            width: w,
            height: h,
            frame: Self::black_frame(w, h)?,
            interval: frame_rate.frame_interval(),
            started: now,
            next_frame_at: now,
            holding: false,
        })
    }

    /// Luma plane of zeros followed by an interleaved chroma plane at 128.
    fn black_frame(width: u32, height: u32) -> Result<Bytes> {
        let too_large = || anyhow!("Capture size {}x{} is too large", width, height);
        let luma = usize::try_from(width)?
            .checked_mul(usize::try_from(height)?)
            .ok_or_else(too_large)?;
        let total = luma.checked_add(luma / 2).ok_or_else(too_large)?;
        let mut data = vec![0u8; total];
        data[luma..].fill(128);
        Ok(Bytes::from(data))
    }
}

impl FrameProducer for GenericFrameProducer {
    fn acquire_next_frame(&mut self, timeout: Duration) -> Result<AcquireResult> {
        if self.holding {
            return Err(anyhow!("Previous frame was not released"));
        }

        let now = Instant::now();
        let wait = self.next_frame_at.saturating_duration_since(now);
        if wait > timeout {
            thread::sleep(timeout);
            return Ok(AcquireResult::Timeout);
        }
        if !wait.is_zero() {
            thread::sleep(wait);
        }

        let present = self.next_frame_at.max(now);
        self.next_frame_at = present + self.interval;
        self.holding = true;

        Ok(AcquireResult::Frame(CapturedFrame {
            data: self.frame.clone(),
            width: self.width,
            height: self.height,
            present_time: time_unit_from_duration(present.duration_since(self.started)),
        }))
    }

    fn release_frame(&mut self) {
        self.holding = false;
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
