//! Shared test harness for integration tests.
//!
//! Provides [`MockSink`], a recording [`MediaSink`] whose backpressure, ready
//! state and buffered ranges are set by the test, and fixture builders that
//! produce WARP init and segment streams from the fMP4 writers.

#![allow(dead_code)]

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;
use warp_media::fmp4::{FragmentSample, InitSegmentBuilder, MoofBuilder};
use warp_media::{InitInfo, Sample};
use warp_player::protocol::{encode_message, InitId, Message, MessageInit, MessageSegment};
use warp_player::{Error, MediaSink, ReadyState, RecvStream, Result, TimeRange, TrackKind};

/// Track id the fixtures use for video, matching the sender.
pub const VIDEO_TRACK: u32 = 2;
/// Track id the fixtures use for audio.
pub const AUDIO_TRACK: u32 = 1;
/// Video timescale: one tick per millisecond keeps timestamps readable.
pub const VIDEO_TIMESCALE: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Initialize(TrackKind, usize),
    Append(TrackKind, f64),
}

#[derive(Debug)]
struct SinkState {
    events: Vec<SinkEvent>,
    payloads: Vec<(TrackKind, Bytes)>,
    accepting: bool,
    /// Presentation times whose append fails.
    rejected: Vec<f64>,
    buffered: Vec<TimeRange>,
    ready_state: ReadyState,
    current_time: f64,
    seeks: Vec<f64>,
    playing: bool,
}

/// Media sink that records everything it receives.
#[derive(Debug)]
pub struct MockSink {
    state: Mutex<SinkState>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SinkState {
                events: Vec::new(),
                payloads: Vec::new(),
                accepting: true,
                rejected: Vec::new(),
                buffered: Vec::new(),
                ready_state: ReadyState::HaveNothing,
                current_time: 0.0,
                seeks: Vec::new(),
                playing: false,
            }),
        })
    }

    /// Toggle whether the sink accepts appends.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    /// Fail the append of any sample presented at `pts`.
    pub fn reject_append_at(&self, pts: f64) {
        self.state.lock().rejected.push(pts);
    }

    pub fn set_buffered(&self, ranges: &[(f64, f64)]) {
        self.state.lock().buffered = ranges
            .iter()
            .map(|&(start, end)| TimeRange::new(start, end))
            .collect();
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
    }

    /// Move the playback position without recording a seek.
    pub fn set_position(&self, time: f64) {
        self.state.lock().current_time = time;
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.state.lock().events.clone()
    }

    /// Presentation times of appended samples for one track, in order.
    pub fn appended(&self, kind: TrackKind) -> Vec<f64> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Append(k, pts) if *k == kind => Some(*pts),
                _ => None,
            })
            .collect()
    }

    /// Payloads of appended samples for one track, in order.
    pub fn payloads(&self, kind: TrackKind) -> Vec<Bytes> {
        self.state
            .lock()
            .payloads
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn initializations(&self) -> Vec<TrackKind> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Initialize(kind, _) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }
}

impl MediaSink for MockSink {
    fn initialize(&self, kind: TrackKind, init: &InitInfo) -> Result<()> {
        self.state
            .lock()
            .events
            .push(SinkEvent::Initialize(kind, init.tracks.len()));
        Ok(())
    }

    fn can_append(&self, _kind: TrackKind) -> bool {
        self.state.lock().accepting
    }

    fn append(&self, kind: TrackKind, sample: &Sample) -> Result<()> {
        let mut state = self.state.lock();
        if state.rejected.contains(&sample.pts_secs()) {
            return Err(Error::Sink(format!(
                "append rejected at {}",
                sample.pts_secs()
            )));
        }
        state.events.push(SinkEvent::Append(kind, sample.pts_secs()));
        state.payloads.push((kind, sample.data.clone()));
        Ok(())
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, time: f64) {
        let mut state = self.state.lock();
        state.current_time = time;
        state.seeks.push(time);
    }

    fn play(&self) {
        self.state.lock().playing = true;
    }

    fn pause(&self) {
        self.state.lock().playing = false;
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn avcc() -> Vec<u8> {
    vec![
        0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00, 0x02,
        0x68, 0xEE,
    ]
}

/// ftyp + moov with one H.264 track.
pub fn video_init() -> Bytes {
    InitSegmentBuilder::new()
        .video(VIDEO_TRACK, VIDEO_TIMESCALE, 1280, 720, avcc())
        .build()
}

/// ftyp + moov with one AAC track.
pub fn audio_init() -> Bytes {
    InitSegmentBuilder::new()
        .audio(AUDIO_TRACK, 48000, 2, 48000, None)
        .build()
}

pub fn parsed(init: &[u8]) -> Arc<InitInfo> {
    Arc::new(InitInfo::parse(init).unwrap().unwrap())
}

/// A frame of `len` bytes filled with `fill`, 40ms long.
pub fn frame(is_keyframe: bool, fill: u8, len: usize) -> FragmentSample {
    FragmentSample {
        duration: 40,
        cts_offset: 0,
        is_keyframe,
        data: Bytes::from(vec![fill; len]),
    }
}

/// moof + mdat for the video track starting at `base_ms`.
pub fn video_fragment(seq: u32, base_ms: u64, samples: &[FragmentSample]) -> (Bytes, Bytes) {
    MoofBuilder::new(seq, VIDEO_TRACK)
        .base_media_decode_time(base_ms)
        .build_atoms(samples)
}

pub fn audio_fragment(seq: u32, base: u64, samples: &[FragmentSample]) -> (Bytes, Bytes) {
    MoofBuilder::new(seq, AUDIO_TRACK)
        .base_media_decode_time(base)
        .build_atoms(samples)
}

pub fn styp() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32(16);
    buf.put_slice(b"styp");
    buf.put_slice(b"msdh");
    buf.put_u32(0);
    buf.freeze()
}

/// Init frame followed by the init bytes.
pub fn init_stream(id: u32, init: &[u8]) -> Vec<u8> {
    let mut data = encode_message(&Message::Init(MessageInit { id: InitId(id) }))
        .unwrap()
        .to_vec();
    data.extend_from_slice(init);
    data
}

/// Segment frame followed by `styp` and the given atoms.
pub fn segment_stream(init: u32, timestamp: u64, atoms: &[Bytes]) -> Vec<u8> {
    let mut data = encode_message(&Message::Segment(MessageSegment {
        init: InitId(init),
        timestamp,
    }))
    .unwrap()
    .to_vec();
    data.extend_from_slice(&styp());
    for atom in atoms {
        data.extend_from_slice(atom);
    }
    data
}

/// A whole stream delivered in one read.
pub fn stream(data: Vec<u8>) -> RecvStream {
    Box::new(std::io::Cursor::new(data))
}

/// A stream delivered in reads of the given sizes (cycled).
pub fn chunked(data: &[u8], sizes: &[usize]) -> RecvStream {
    let mut builder = tokio_test::io::Builder::new();
    let mut pos = 0;
    let mut i = 0;
    while pos < data.len() {
        let n = sizes[i % sizes.len()].max(1).min(data.len() - pos);
        builder.read(&data[pos..pos + n]);
        pos += n;
        i += 1;
    }
    Box::new(builder.build())
}
