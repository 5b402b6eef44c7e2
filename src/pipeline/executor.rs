//! Shared work queue
//!
//! Every callback in the pipeline (timer fires, sample dispatch, serve loop
//! re-entries) runs as a work item on one tokio runtime. Components never spin
//! their own threads.

use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, Result};

/// Handle to the runtime that executes pipeline work items.
#[derive(Clone, Debug)]
pub struct WorkQueue {
    handle: Handle,
}

impl WorkQueue {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Work queue bound to the runtime of the calling thread.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| PipelineError::TimerUnavailable(e.to_string()))
    }

    /// Run `work` as soon as a worker is free.
    pub fn submit<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.spawn(async move { work() });
    }

    /// Run `work` once `deadline` passes, unless the returned token is
    /// cancelled first.
    pub fn schedule_at<F>(&self, deadline: Instant, work: F) -> CancellationToken
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => work(),
            }
        });
        token
    }

    /// Run `work` after `delay`.
    pub fn schedule_after<F>(&self, delay: Duration, work: F) -> CancellationToken
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_at(Instant::now() + delay, work)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}
