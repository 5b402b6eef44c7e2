//! Pull-based media pipeline
//!
//! This module provides the dataflow engine the recorder is built on,
//! separating concerns between:
//! - Timing: the presentation clock and clock-driven callbacks
//! - Lifecycle: topologies and the message generator that starts, switches
//!   and drains them
//! - Data transport: requests travelling upstream, samples travelling back
//!   downstream, reordered by packet number
//! - Buffers: lockable samples shared between producer and consumer
//!
//! # Architecture
//!
//! A topology is a graph of stream nodes. Sinks drive it: each frame period
//! they send a request upstream, sources answer it once they hold data up to
//! the requested frame, and the session routes the answer back down. Every
//! callback runs on one shared work queue.
//! Health monitoring counts everything that is absorbed rather than reported.

pub mod clock;
pub mod clock_sink;
pub mod executor;
pub mod health;
pub mod message_generator;
pub mod request_queue;
pub mod sample;
pub mod session;
pub mod sink;
pub mod source;
pub mod state;
pub mod topology;
pub mod types;

pub use clock::{MediaClock, SystemTimeSource, TimeSource};
pub use clock_sink::{ClockSink, Schedulable};
pub use executor::WorkQueue;
pub use health::{HealthAlert, HealthMonitor, PipelineHealth};
pub use message_generator::{ComponentKey, MessageGenerator, StreamListener};
pub use request_queue::{Request, RequestQueue, Sequenced};
pub use sample::{LockMode, Sample, SampleRef, SampleView};
pub use session::{Session, SessionEvent, SessionOptions};
pub use sink::{FileSink, FileSinkStream, OutputWriter, SinkOptions};
pub use source::{SourceBase, SourceImpl, SourceRequest, SourceStream};
pub use state::PipelineState;
pub use topology::{MediaStream, StreamId, Topology, TopologyBuilder, TopologyRef};
pub use types::{
    AudioArgs, FrameNumber, FrameRate, MediaKind, Payload, RequestFlags, RequestPacket,
    SourceArgs, TimeUnit, VideoArgs,
};
