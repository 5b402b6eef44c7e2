//! Core types for the pipeline system

use std::ops::BitOr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sample::SampleRef;
use super::topology::TopologyRef;

/// Presentation time in 100 ns ticks.
pub type TimeUnit = i64;

/// Index of a frame period on the presentation timeline.
pub type FrameNumber = i64;

pub const SECOND_IN_TIME_UNIT: TimeUnit = 10_000_000;

/// Convert a duration to ticks, saturating at `TimeUnit::MAX`.
pub fn time_unit_from_duration(duration: Duration) -> TimeUnit {
    TimeUnit::try_from(duration.as_nanos() / 100).unwrap_or(TimeUnit::MAX)
}

/// Convert ticks to a duration. Negative values clamp to zero.
pub fn duration_from_time_unit(time: TimeUnit) -> Duration {
    let time = time.max(0);
    let secs = (time / SECOND_IN_TIME_UNIT) as u64;
    let nanos = (time % SECOND_IN_TIME_UNIT) as u32 * 100;
    Duration::new(secs, nanos)
}

/// Frame rate as a rational number of frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Frame period containing `time`, rounded toward negative infinity.
    pub fn to_frame(&self, time: TimeUnit) -> FrameNumber {
        let scaled = time as i128 * self.num as i128;
        let divisor = self.den as i128 * SECOND_IN_TIME_UNIT as i128;
        scaled.div_euclid(divisor) as FrameNumber
    }

    /// Start time of `frame`: the first tick that [`to_frame`](Self::to_frame)
    /// maps onto it.
    pub fn to_time(&self, frame: FrameNumber) -> TimeUnit {
        let scaled = frame as i128 * self.den as i128 * SECOND_IN_TIME_UNIT as i128;
        -((-scaled).div_euclid(self.num as i128)) as TimeUnit
    }

    /// Length of one frame period in ticks.
    pub fn frame_duration(&self) -> TimeUnit {
        self.to_time(1)
    }

    pub fn frame_interval(&self) -> Duration {
        duration_from_time_unit(self.frame_duration())
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{} fps", self.num)
        } else {
            write!(f, "{}/{} fps", self.num, self.den)
        }
    }
}

/// Kind of media data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video frame data
    Video,
    /// Audio sample data
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Flags carried by a [`RequestPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestFlags(u32);

impl RequestFlags {
    pub const NONE: RequestFlags = RequestFlags(0);
    /// Final request of a topology that is being stopped.
    pub const DRAIN: RequestFlags = RequestFlags(1);
    /// Final request of a topology that is being replaced.
    pub const LAST_PACKET: RequestFlags = RequestFlags(1 << 1);

    pub fn contains(&self, other: RequestFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for RequestFlags {
    type Output = RequestFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        RequestFlags(self.0 | rhs.0)
    }
}

/// A pull request travelling upstream through one topology.
#[derive(Clone)]
pub struct RequestPacket {
    pub topology: TopologyRef,
    pub flags: RequestFlags,
    /// Presentation time the requester wants data up to.
    pub request_time: TimeUnit,
    /// Clock time at which the request was issued.
    pub timestamp: TimeUnit,
    pub packet_number: u64,
}

impl RequestPacket {
    pub fn is_drain(&self) -> bool {
        self.flags.contains(RequestFlags::DRAIN)
    }

    pub fn is_last_packet(&self) -> bool {
        self.flags.contains(RequestFlags::LAST_PACKET)
    }

    /// Whether serving this request retires its topology from a source.
    pub fn ends_topology(&self) -> bool {
        self.is_drain() || self.is_last_packet()
    }
}

impl std::fmt::Debug for RequestPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacket")
            .field("topology", &self.topology.id())
            .field("flags", &self.flags)
            .field("request_time", &self.request_time)
            .field("timestamp", &self.timestamp)
            .field("packet_number", &self.packet_number)
            .finish()
    }
}

/// Payload produced by a source for one request.
///
/// Implemented by each concrete payload type so the pull framework stays
/// generic over what a source emits.
pub trait SourceArgs: Clone + Send + Sync + 'static {
    /// A well-formed reply without sample data, covering up to `frame_end`.
    fn skip(frame_end: FrameNumber) -> Self;

    fn frame_end(&self) -> FrameNumber;

    fn sample(&self) -> Option<&SampleRef>;

    fn into_payload(self) -> Payload;
}

/// Video reply: the newest frame up to `frame_end`, if one exists.
#[derive(Debug, Clone)]
pub struct VideoArgs {
    pub sample: Option<SampleRef>,
    pub frame_end: FrameNumber,
}

impl SourceArgs for VideoArgs {
    fn skip(frame_end: FrameNumber) -> Self {
        Self {
            sample: None,
            frame_end,
        }
    }

    fn frame_end(&self) -> FrameNumber {
        self.frame_end
    }

    fn sample(&self) -> Option<&SampleRef> {
        self.sample.as_ref()
    }

    fn into_payload(self) -> Payload {
        Payload::Video(self)
    }
}

/// Audio reply: PCM covering the span that ends at `frame_end`.
#[derive(Debug, Clone)]
pub struct AudioArgs {
    pub sample: Option<SampleRef>,
    pub frame_end: FrameNumber,
    /// Number of PCM frames in `sample`.
    pub sample_count: u32,
}

impl SourceArgs for AudioArgs {
    fn skip(frame_end: FrameNumber) -> Self {
        Self {
            sample: None,
            frame_end,
            sample_count: 0,
        }
    }

    fn frame_end(&self) -> FrameNumber {
        self.frame_end
    }

    fn sample(&self) -> Option<&SampleRef> {
        self.sample.as_ref()
    }

    fn into_payload(self) -> Payload {
        Payload::Audio(self)
    }
}

/// Payload routed between streams by the session.
#[derive(Debug, Clone)]
pub enum Payload {
    Video(VideoArgs),
    Audio(AudioArgs),
}

impl Payload {
    pub fn kind(&self) -> MediaKind {
        match self {
            Payload::Video(_) => MediaKind::Video,
            Payload::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn sample(&self) -> Option<&SampleRef> {
        match self {
            Payload::Video(args) => args.sample(),
            Payload::Audio(args) => args.sample(),
        }
    }

    pub fn frame_end(&self) -> FrameNumber {
        match self {
            Payload::Video(args) => args.frame_end,
            Payload::Audio(args) => args.frame_end,
        }
    }
}
