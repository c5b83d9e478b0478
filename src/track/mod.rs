//! Per-track ordering and flush discipline.
//!
//! Segment streams for one track arrive concurrently, but the sink must see
//! their samples strictly in order. A [`TrackBuffer`] keeps segments in
//! arrival order and only drains the front one; the next segment is not
//! touched until the front has finished and been fully drained.
//!
//! Extracted samples wait in a pending queue until the sink accepts them.
//! That queue is what [`TrackBuffer::advance`] trims when playback has fallen
//! behind.

mod segment;

pub use segment::Segment;

use crate::init::InitId;
use crate::sink::{MediaSink, TrackKind};
use crate::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use warp_media::Sample;

/// Handle used by a decode task to address the segment it registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    id: SegmentId,
    segment: Segment,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    segments: VecDeque<Entry>,
    pending: VecDeque<Sample>,
    /// Init the sink was last initialized with for this track.
    init_id: Option<InitId>,
}

impl Inner {
    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
        self.segments
            .iter_mut()
            .find(|entry| entry.id == id)
            .map(|entry| &mut entry.segment)
            .ok_or_else(|| Error::protocol(format!("unknown segment {}", id)))
    }
}

/// Ordered segments and pending samples for one track.
pub struct TrackBuffer {
    kind: TrackKind,
    sink: Arc<dyn MediaSink>,
    inner: Mutex<Inner>,
}

impl TrackBuffer {
    pub fn new(kind: TrackKind, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            kind,
            sink,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Queue a segment behind every segment added before it.
    pub fn add(&self, segment: Segment) -> SegmentId {
        let mut inner = self.inner.lock();

        let id = SegmentId(inner.next_id);
        inner.next_id += 1;

        tracing::debug!(
            kind = %self.kind,
            segment = %id,
            init_id = %segment.init_id(),
            timestamp = segment.timestamp(),
            queued = inner.segments.len(),
            "Added segment"
        );
        inner.segments.push_back(Entry { id, segment });

        id
    }

    /// Append an atom to a queued segment.
    pub fn push(&self, id: SegmentId, atom: Bytes) -> Result<()> {
        self.inner.lock().segment_mut(id)?.push(atom)
    }

    /// Mark a queued segment complete.
    pub fn finish(&self, id: SegmentId) -> Result<()> {
        let mut inner = self.inner.lock();
        let segment = inner.segment_mut(id)?;
        if segment.has_partial_fragment() {
            tracing::warn!(kind = %self.kind, segment = %id, "Segment ended inside a fragment");
        }
        segment.finish()
    }

    /// Move newly available samples toward the sink.
    ///
    /// Only the front segment is drained. It is dropped once finished, and
    /// the next one becomes active within the same call. Pending samples are
    /// then appended for as long as the sink accepts them. Calling this with
    /// nothing new is a no-op.
    ///
    /// The sink is (re)initialized when a segment with a different init
    /// reaches the front, and only after every pending sample of the
    /// previous init has been appended.
    ///
    /// A front segment whose atoms fail to parse is discarded so the track
    /// keeps moving; its own decode task finds out on its next push. Sink
    /// failures are logged here and never reach the caller, which may be
    /// the decode task of an unrelated segment.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        while let Some(front) = inner.segments.front_mut() {
            if inner.init_id != Some(front.segment.init_id()) {
                self.append_pending(&mut inner.pending);
                if !inner.pending.is_empty() {
                    break;
                }

                tracing::debug!(
                    kind = %self.kind,
                    init_id = %front.segment.init_id(),
                    "Initializing sink"
                );
                if let Err(e) = self.sink.initialize(self.kind, front.segment.init()) {
                    tracing::warn!(
                        kind = %self.kind,
                        init_id = %front.segment.init_id(),
                        error = %e,
                        "Failed to initialize sink"
                    );
                }
                inner.init_id = Some(front.segment.init_id());
            }

            match front.segment.take_samples() {
                Ok(samples) => inner.pending.extend(samples),
                Err(e) => {
                    tracing::warn!(
                        kind = %self.kind,
                        segment = %front.id,
                        error = %e,
                        "Discarding unparseable segment"
                    );
                    inner.segments.pop_front();
                    continue;
                }
            }

            if !front.segment.is_finished() {
                break;
            }

            tracing::debug!(
                kind = %self.kind,
                segment = %front.id,
                timestamp = front.segment.timestamp(),
                "Segment drained"
            );
            inner.segments.pop_front();
        }

        self.append_pending(&mut inner.pending);
    }

    fn append_pending(&self, pending: &mut VecDeque<Sample>) {
        while let Some(sample) = pending.front() {
            if !self.sink.can_append(self.kind) {
                break;
            }

            if let Err(e) = self.sink.append(self.kind, sample) {
                tracing::warn!(
                    kind = %self.kind,
                    pts = sample.pts_secs(),
                    error = %e,
                    "Sink rejected sample"
                );
            }
            pending.pop_front();
        }
    }

    /// Drop pending samples that playback has already passed.
    ///
    /// With a playhead, samples presented before it are dropped. Without one
    /// nothing is playing, so everything before the newest pending keyframe
    /// goes and decoding restarts from the freshest point.
    pub fn advance(&self, playhead: Option<f64>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.pending.len();

        match playhead {
            Some(time) => inner.pending.retain(|sample| sample.pts_secs() >= time),
            None => {
                if let Some(keyframe) = inner.pending.iter().rposition(|s| s.is_keyframe) {
                    inner.pending.drain(..keyframe);
                }
            }
        }

        let dropped = before - inner.pending.len();
        if dropped > 0 {
            tracing::warn!(kind = %self.kind, dropped, ?playhead, "Skipped stale samples");
        }
        dropped
    }

    /// Samples waiting for the sink.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Presentation times of the pending samples, in queue order.
    pub fn pending_times(&self) -> Vec<f64> {
        self.inner
            .lock()
            .pending
            .iter()
            .map(Sample::pts_secs)
            .collect()
    }

    /// Segments queued, including the active one.
    pub fn segment_count(&self) -> usize {
        self.inner.lock().segments.len()
    }
}

impl fmt::Debug for TrackBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TrackBuffer")
            .field("kind", &self.kind)
            .field("segments", &inner.segments.len())
            .field("pending", &inner.pending.len())
            .finish()
    }
}
