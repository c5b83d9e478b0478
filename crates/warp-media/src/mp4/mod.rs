//! MP4 initialization segment parsing.
//!
//! An initialization segment is the `ftyp` + `moov` pair that describes the
//! tracks of a fragmented stream. [`InitInfo::parse`] accepts a growing
//! buffer and only succeeds once a complete `moov` is present, so callers
//! can feed it bytes as they arrive.

mod atoms;
mod reader;

pub use atoms::{
    children, read_u32, read_u64, Atom, AtomType, HandlerType, TrackDefaults, TrackInfo,
};
use reader::Mp4Reader;

use crate::Result;
use bytes::Bytes;
use std::io::Cursor;

/// Parsed initialization segment.
#[derive(Debug, Clone)]
pub struct InitInfo {
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// Duration in movie timescale units (usually zero for live streams).
    pub duration: u64,
    /// Every track declared by the moov, in declaration order.
    pub tracks: Vec<TrackInfo>,
    /// Raw bytes up to and including the moov, ready to hand to a decoder.
    pub raw: Bytes,
}

impl InitInfo {
    /// Try to parse an initialization segment from the bytes received so far.
    ///
    /// Returns `Ok(None)` if more bytes are needed.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        let mut reader = Mp4Reader::new(Cursor::new(data))?;

        match reader.read_init()? {
            Some((mut init, end)) => {
                init.raw = Bytes::copy_from_slice(&data[..end as usize]);
                Ok(Some(init))
            }
            None => Ok(None),
        }
    }

    /// Whether any declared track is a video track.
    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.handler_type.is_video())
    }

    /// Whether any declared track is an audio track.
    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.handler_type.is_audio())
    }

    /// Look up a track by ID.
    pub fn track(&self, track_id: u32) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Codec strings of every track, comma separated (MIME `codecs=` value).
    pub fn codecs(&self) -> String {
        self.tracks
            .iter()
            .filter_map(TrackInfo::codec_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }
}
