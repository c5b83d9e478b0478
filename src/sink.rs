//! Media sink boundary.
//!
//! The sink decodes and renders. Its model follows an HTML media element fed
//! through Media Source Extensions: one source buffer per track kind, a list
//! of buffered time ranges, a ready state and a playback position.

use crate::Result;
use std::fmt;
use warp_media::{InitInfo, Sample};

/// Which source buffer a segment feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    /// Video wins when an initialization declares both kinds.
    pub fn for_init(init: &InitInfo) -> Self {
        if init.has_video() {
            Self::Video
        } else {
            Self::Audio
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playback readiness, ordered like `HTMLMediaElement.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    /// Whether there is data beyond the current frame, so playback can
    /// advance.
    pub fn is_sufficient(self) -> bool {
        self > Self::HaveCurrentData
    }
}

/// A buffered interval, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Host media pipeline that receives initialization and samples.
///
/// Calls are synchronous and must not block; the sink queues work
/// internally and reports backpressure through [`MediaSink::can_append`].
pub trait MediaSink: Send + Sync {
    /// (Re)initialize the track's decoder with a new initialization segment.
    fn initialize(&self, kind: TrackKind, init: &InitInfo) -> Result<()>;

    /// Whether the track's buffer accepts another append right now.
    fn can_append(&self, kind: TrackKind) -> bool;

    /// Append one sample to the track's buffer.
    fn append(&self, kind: TrackKind, sample: &Sample) -> Result<()>;

    /// Buffered ranges of the presentation, in any order.
    fn buffered(&self) -> Vec<TimeRange>;

    fn ready_state(&self) -> ReadyState;

    fn current_time(&self) -> f64;

    fn set_current_time(&self, time: f64);

    fn play(&self);

    fn pause(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_threshold() {
        assert!(!ReadyState::HaveNothing.is_sufficient());
        assert!(!ReadyState::HaveCurrentData.is_sufficient());
        assert!(ReadyState::HaveFutureData.is_sufficient());
        assert!(ReadyState::HaveEnoughData.is_sufficient());
    }
}
