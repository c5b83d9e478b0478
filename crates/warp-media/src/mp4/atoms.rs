//! MP4 atom definitions and slice-level helpers.

use crate::{Error, Result};

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MOOF: Self = Self(*b"moof");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const SIDX: Self = Self(*b"sidx");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");
    pub const UDTA: Self = Self(*b"udta");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// Offset where atom data starts (after header).
    pub data_offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Get the data size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// Offset of the first byte of the atom header.
    pub fn start(&self) -> u64 {
        self.data_offset - self.header_size as u64
    }

    /// Offset one past the last byte of the atom.
    pub fn end(&self) -> u64 {
        self.start() + self.size
    }

    /// Parse the header of the atom at the front of `data`.
    ///
    /// Returns `Ok(None)` when fewer bytes than the header are available.
    /// Atoms with a size of zero ("extends to end of file") cannot be
    /// delimited on a live stream and are rejected.
    pub fn peek(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < 8 {
            return Ok(None);
        }

        let size = read_u32(data, 0)? as u64;
        let atom_type = AtomType::from_bytes([data[4], data[5], data[6], data[7]]);

        let (size, header_size) = match size {
            0 => {
                return Err(Error::unsupported(format!(
                    "atom {} with open-ended size",
                    atom_type
                )))
            }
            1 => {
                if data.len() < 16 {
                    return Ok(None);
                }
                (read_u64(data, 8)?, 16u8)
            }
            size => (size, 8u8),
        };

        if size < header_size as u64 {
            return Err(Error::invalid_mp4(format!(
                "atom {} size {} smaller than its header",
                atom_type, size
            )));
        }

        Ok(Some(Self {
            atom_type,
            size,
            data_offset: header_size as u64,
            header_size,
        }))
    }
}

/// Split a buffer holding a sequence of complete atoms into `(type, payload)`
/// pairs.
pub fn children(data: &[u8]) -> Result<Vec<(AtomType, &[u8])>> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let atom = Atom::peek(&data[pos..])?.ok_or(Error::truncated(8, data.len() - pos))?;

        let end = pos as u64 + atom.size;
        if end > data.len() as u64 {
            return Err(Error::invalid_mp4(format!(
                "atom {} overruns its parent ({} > {})",
                atom.atom_type,
                end,
                data.len()
            )));
        }

        out.push((
            atom.atom_type,
            &data[pos + atom.header_size as usize..end as usize],
        ));
        pos = end as usize;
    }

    Ok(out)
}

/// Read a big-endian u32 at `pos`.
pub fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    let bytes = data.get(pos..pos + 4).ok_or(Error::truncated(pos + 4, data.len()))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a big-endian u64 at `pos`.
pub fn read_u64(data: &[u8], pos: usize) -> Result<u64> {
    let hi = read_u32(data, pos)? as u64;
    let lo = read_u32(data, pos + 4)? as u64;
    Ok(hi << 32 | lo)
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

/// Per-track fragment defaults from the `trex` atom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackDefaults {
    pub sample_description_index: u32,
    pub sample_duration: u32,
    pub sample_size: u32,
    pub sample_flags: u32,
}

/// Track information extracted from a trak atom.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Track ID.
    pub track_id: u32,
    /// Handler type (video/audio/etc).
    pub handler_type: HandlerType,
    /// Track duration in media timescale.
    pub duration: u64,
    /// Media timescale (ticks per second for this track).
    pub timescale: u32,
    /// Sample entry code of the first sample description (avc1, mp4a, ...).
    pub sample_entry: Option<AtomType>,
    /// Codec configuration data (avcC, hvcC, esds, etc).
    pub codec_data: Option<Vec<u8>>,
    /// Width (for video tracks).
    pub width: Option<u32>,
    /// Height (for video tracks).
    pub height: Option<u32>,
    /// Sample rate (for audio tracks).
    pub sample_rate: Option<u32>,
    /// Channel count (for audio tracks).
    pub channels: Option<u16>,
    /// Fragment defaults declared in mvex.
    pub defaults: TrackDefaults,
}

impl TrackInfo {
    /// Create empty track info.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler_type: HandlerType::Unknown([0; 4]),
            duration: 0,
            timescale: 1,
            sample_entry: None,
            codec_data: None,
            width: None,
            height: None,
            sample_rate: None,
            channels: None,
            defaults: TrackDefaults::default(),
        }
    }

    /// Get duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }

    /// RFC 6381 codec string, e.g. `avc1.64001f` or `mp4a.40.2`.
    pub fn codec_string(&self) -> Option<String> {
        let entry = self.sample_entry?;
        let config = self.codec_data.as_deref();

        match &entry.0 {
            b"avc1" | b"avc3" => match config {
                Some(avcc) if avcc.len() >= 4 => Some(format!(
                    "{}.{:02x}{:02x}{:02x}",
                    entry, avcc[1], avcc[2], avcc[3]
                )),
                _ => Some(entry.to_string()),
            },
            b"mp4a" => match config.and_then(aac_object_type) {
                Some(aot) => Some(format!("mp4a.40.{}", aot)),
                None => Some("mp4a.40.2".to_string()),
            },
            _ => Some(entry.to_string()),
        }
    }
}

/// Pull the audio object type out of an esds payload (version/flags
/// included).
fn aac_object_type(esds: &[u8]) -> Option<u8> {
    let mut pos = 4;

    // Descriptor length uses up to four 7-bit continuation bytes.
    let read_len = |pos: &mut usize| -> Option<usize> {
        let mut len = 0usize;
        for _ in 0..4 {
            let b = *esds.get(*pos)?;
            *pos += 1;
            len = (len << 7) | (b & 0x7f) as usize;
            if b & 0x80 == 0 {
                break;
            }
        }
        Some(len)
    };

    while pos < esds.len() {
        let tag = esds[pos];
        pos += 1;
        let len = read_len(&mut pos)?;

        match tag {
            // ES_Descriptor: ES_ID(2) + flags(1), then nested descriptors
            0x03 => {
                let flags = *esds.get(pos + 2)?;
                pos += 3;
                if flags & 0x80 != 0 {
                    pos += 2;
                }
                if flags & 0x40 != 0 {
                    let url_len = *esds.get(pos)? as usize;
                    pos += 1 + url_len;
                }
                if flags & 0x20 != 0 {
                    pos += 2;
                }
            }
            // DecoderConfigDescriptor: fixed 13 bytes, then DecoderSpecificInfo
            0x04 => pos += 13,
            0x05 => {
                let aot = *esds.get(pos)? >> 3;
                return if aot == 0 { None } else { Some(aot) };
            }
            _ => pos += len,
        }
    }

    None
}
