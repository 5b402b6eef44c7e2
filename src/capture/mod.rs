//! Capture sources
//!
//! The desktop capture leaf source and the producers behind it, plus a
//! silent audio track for hosts without an audio device.

pub mod display_capture;
mod generic;
pub mod silence;
mod traits;

pub use display_capture::{DisplayCapture, DisplayCaptureOptions};
pub use generic::{GenericFrameProducer, MAX_FRAME_DIMENSION};
pub use silence::SilenceSource;
pub use traits::{AcquireResult, CapturedFrame, FrameProducer};
