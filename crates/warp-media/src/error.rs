//! Error types for warp-media.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while reading or writing fMP4 structures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Box layout or field values are not valid ISO BMFF.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Valid MP4 that live fragments are not expected to use.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A box ends before the fields it declares.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },

    /// A fragment names a track the initialization does not declare.
    #[error("Track {0} is not declared by the init segment")]
    UnknownTrack(u32),
}

impl Error {
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn truncated(need: usize, have: usize) -> Self {
        Self::BufferUnderflow { need, have }
    }
}
