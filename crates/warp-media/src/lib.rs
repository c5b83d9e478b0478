//! warp-media: fragmented MP4 parsing for the WARP player
//!
//! This crate understands the two kinds of payload a WARP sender puts on the
//! wire: initialization segments (`ftyp` + `moov`) and media segments made of
//! `moof` + `mdat` pairs. It has no async or I/O dependencies so it can be
//! driven incrementally from whatever bytes have arrived.
//!
//! # Modules
//!
//! - `mp4` - Initialization segment parsing (moov, trak, stsd, trex)
//! - `fmp4` - Movie fragment parsing and sample extraction, plus writers for
//!   init and fragment atoms
//!
//! # Incremental use
//!
//! [`InitInfo::parse`] returns `Ok(None)` until a complete `moov` is
//! buffered. [`Fragment::parse`] takes one complete `moof`, and
//! [`Fragment::samples`] resolves its samples once the following `mdat` is
//! available. Sample payloads are zero-copy slices of the `mdat`.

pub mod error;
pub mod fmp4;
pub mod mp4;

pub use error::{Error, Result};
pub use fmp4::{Fragment, Sample};
pub use mp4::{AtomType, InitInfo, TrackInfo};
