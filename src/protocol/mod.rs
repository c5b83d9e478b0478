//! WARP wire protocol.
//!
//! Every stream starts with one frame:
//!
//! ```text
//! | size: u32 be | "warp" | (size - 8) bytes of JSON |
//! ```
//!
//! The JSON object has exactly one key naming the message type. What follows
//! the frame depends on that type: raw initialization bytes for `init`, a
//! sequence of length-prefixed MP4 atoms for `segment`.

mod codec;
mod reader;
mod writer;

pub use codec::{decode_frame, encode_message, read_message, FRAME_HEADER_SIZE, FRAME_TAG};
pub use reader::StreamReader;
pub use writer::ControlChannel;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an initialization segment (the sender uses 1 for audio and 2
/// for video).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct InitId(pub u32);

impl fmt::Display for InitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for InitId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Message {
    /// The stream carries initialization bytes.
    Init(MessageInit),
    /// The stream carries one media segment.
    Segment(MessageSegment),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessageInit {
    pub id: InitId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessageSegment {
    /// Initialization this segment's samples are described by.
    pub init: InitId,
    /// Presentation timestamp in milliseconds.
    pub timestamp: u64,
}

/// Host-originated message sent on the control stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Ask the sender to shape its output, for testing under poor networks.
    Throttle(MessageThrottle),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageThrottle {
    /// Write rate in bytes per second.
    pub rate: u64,
    /// Write buffer size in bytes.
    pub buffer: u64,
    /// Packet loss ratio in `0.0..=1.0`.
    pub loss: f64,
}
