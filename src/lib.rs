//! WARP player - client-side receiver for the WARP live media protocol
//!
//! The sender opens one unidirectional stream per message. Init streams carry
//! an fMP4 initialization segment; segment streams carry the `moof`/`mdat`
//! atoms of one media segment. This crate decodes those streams, rebuilds
//! strictly ordered per-track sample sequences and feeds them to a
//! [`MediaSink`], while a control loop keeps live latency bounded.
//!
//! # Modules
//!
//! - `protocol` - WARP framing, stream reads and the outbound control channel
//! - `init` - Initialization assembly and the session's init registry
//! - `track` - Segments and the per-track flush discipline
//! - `dispatcher` - One decode task per inbound stream
//! - `controller` - Seek-ahead, skip-ahead and go-live
//! - `player` - Session construction and teardown
//!
//! The transport session itself and the decoder behind the sink live outside
//! this crate; see [`Transport`] and [`MediaSink`].

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod init;
pub mod player;
pub mod protocol;
pub mod sink;
pub mod track;
pub mod transport;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use init::{InitAssembler, InitId, InitRegistry, Turn};
pub use player::Player;
pub use protocol::{Command, Message};
pub use sink::{MediaSink, ReadyState, TimeRange, TrackKind};
pub use track::{Segment, SegmentId, TrackBuffer};
pub use transport::{RecvStream, SendStream, Transport};
