//! Traits for screen capture functionality

use std::time::Duration;

use bytes::Bytes;

use crate::pipeline::TimeUnit;

/// One frame handed out by a [`FrameProducer`].
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// NV12 pixel data
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Presentation time reported by the producer, on its own time base.
    pub present_time: TimeUnit,
}

/// Outcome of a bounded frame acquisition
#[derive(Debug)]
pub enum AcquireResult {
    Frame(CapturedFrame),
    /// No new frame within the timeout
    Timeout,
}

/// Hardware frame source, e.g. a desktop duplication session
///
/// At most one frame is held at a time: the caller releases the previous
/// frame before acquiring the next one. An `Err` from
/// [`acquire_next_frame`](Self::acquire_next_frame) means the producer is
/// unusable until rebuilt.
pub trait FrameProducer: Send {
    fn acquire_next_frame(&mut self, timeout: Duration) -> anyhow::Result<AcquireResult>;

    fn release_frame(&mut self);

    /// Resolution of the produced frames in (width, height)
    fn resolution(&self) -> (u32, u32);
}
