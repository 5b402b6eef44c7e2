//! Error types for the capture pipeline
//!
//! Timeouts and dropped frames are absorbed by the node that saw them and only
//! show up in [`PipelineHealth`](crate::pipeline::PipelineHealth). Everything
//! else is reported to the controller as a [`PipelineError`];
//! [`PipelineError::is_fatal`] separates the errors that end the topology from
//! the ones it survives (a failed capture device, a slow drain).

use crate::pipeline::state::PipelineState;
use crate::pipeline::types::TimeUnit;

/// Errors surfaced by pipeline components to the session and controller.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A packet number was pushed below the already consumed window.
    #[error("packet {packet_number} arrived after the queue advanced past it (first = {first})")]
    SequenceViolation {
        /// The offending packet number.
        packet_number: u64,
        /// First packet number still held by the queue.
        first: u64,
    },

    /// A packet number was pushed twice.
    #[error("packet {0} was queued twice")]
    DuplicatePacket(u64),

    /// Output timestamps went backwards while strict ordering is enabled.
    #[error("non-increasing output timestamp: {current} after {previous}")]
    OrderingViolation {
        /// Timestamp of the last written sample.
        previous: TimeUnit,
        /// Timestamp of the rejected sample.
        current: TimeUnit,
    },

    /// The output writer failed; the topology stops producing work.
    #[error("output writer failed: {0}")]
    Writer(#[source] anyhow::Error),

    /// A source could not produce data and now serves skip frames until it
    /// is rebuilt.
    #[error("capture failed: {0}")]
    Capture(#[source] anyhow::Error),

    /// No runtime is available to arm timers or run work items.
    #[error("work queue is unavailable: {0}")]
    TimerUnavailable(String),

    /// A topology operation was requested while no topology is live.
    #[error("no topology is running")]
    NotRunning,

    /// A session operation was called in a state that does not allow it.
    #[error("cannot {action} while the session is {state}")]
    InvalidState {
        /// Operation that was refused.
        action: &'static str,
        /// Session state at the time of the call.
        state: PipelineState,
    },

    /// The topology did not drain before the configured timeout.
    #[error("topology did not drain within {0:?}")]
    DrainTimeout(std::time::Duration),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether the error terminates the topology it was raised for.
    ///
    /// Controller misuse and configuration errors are returned to the caller
    /// and leave any live topology untouched. A capture failure is absorbed
    /// by the broken source, a drain timeout by the forced stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::Capture(_)
                | PipelineError::DrainTimeout(_)
                | PipelineError::NotRunning
                | PipelineError::InvalidState { .. }
                | PipelineError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
