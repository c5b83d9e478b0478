//! MP4 reader for initialization segments.

use super::{Atom, AtomType, HandlerType, InitInfo, TrackDefaults, TrackInfo};
use crate::{Error, Result};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed input.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// Reads the `moov` of an initialization segment.
pub(crate) struct Mp4Reader<R> {
    reader: R,
    len: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    /// Create a new MP4 reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, len })
    }

    /// Scan top-level atoms and parse the first complete `moov`.
    ///
    /// Returns `Ok(None)` while the buffered data ends before a complete
    /// `moov` has been seen. The returned length is the offset just past the
    /// `moov`.
    pub fn read_init(&mut self) -> Result<Option<(InitInfo, u64)>> {
        let atoms = self.read_atoms(0, self.len)?;

        for atom in &atoms {
            if atom.end() > self.len {
                return Ok(None);
            }

            match atom.atom_type {
                AtomType::MOOV => {
                    let init = self.parse_moov(atom)?;
                    return Ok(Some((init, atom.end())));
                }
                AtomType::MOOF | AtomType::MDAT => {
                    return Err(Error::invalid_mp4(format!(
                        "{} before moov in initialization segment",
                        atom.atom_type
                    )));
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// Read atom headers between `start` and `end`.
    ///
    /// The last header may describe an atom that extends past `end`; callers
    /// decide whether that means "incomplete" or "corrupt".
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while pos < end {
            self.reader.seek(SeekFrom::Start(pos))?;

            let available = (end - pos).min(16) as usize;
            let mut header = [0u8; 16];
            if self.reader.read_exact(&mut header[..available]).is_err() {
                break;
            }

            let Some(mut atom) = Atom::peek(&header[..available])? else {
                break;
            };
            atom.data_offset += pos;

            pos += atom.size;
            atoms.push(atom);
        }

        Ok(atoms)
    }

    /// Read the children of a container, rejecting children that overrun it.
    fn read_children(&mut self, parent: &Atom) -> Result<Vec<Atom>> {
        let end = parent.data_offset + parent.data_size();
        let children = self.read_atoms(parent.data_offset, end)?;

        if let Some(last) = children.last() {
            if last.end() > end {
                return Err(Error::invalid_mp4(format!(
                    "{} overruns parent {}",
                    last.atom_type, parent.atom_type
                )));
            }
        }

        Ok(children)
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::InvalidMp4(format!(
                "Atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Parse moov atom.
    fn parse_moov(&mut self, moov: &Atom) -> Result<InitInfo> {
        let children = self.read_children(moov)?;

        let mut init = InitInfo {
            timescale: 1000,
            duration: 0,
            tracks: Vec::new(),
            raw: Default::default(),
        };
        let mut defaults = HashMap::new();

        for child in &children {
            match child.atom_type {
                AtomType::MVHD => self.parse_mvhd(child, &mut init)?,
                AtomType::TRAK => init.tracks.push(self.parse_trak(child)?),
                AtomType::MVEX => self.parse_mvex(child, &mut defaults)?,
                _ => {}
            }
        }

        if init.tracks.is_empty() {
            return Err(Error::MissingAtom("trak"));
        }

        for track in &mut init.tracks {
            if let Some(d) = defaults.get(&track.track_id) {
                track.defaults = *d;
            }
        }

        Ok(init)
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, init: &mut InitInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        if data.is_empty() {
            return Ok(());
        }

        let version = data[0];

        if version == 0 {
            // 32-bit timestamps
            if data.len() >= 20 {
                init.timescale = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
                init.duration = u32::from_be_bytes([data[16], data[17], data[18], data[19]]) as u64;
            }
        } else if data.len() >= 32 {
            // 64-bit timestamps
            init.timescale = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
            init.duration = u64::from_be_bytes([
                data[24], data[25], data[26], data[27], data[28], data[29], data[30], data[31],
            ]);
        }

        Ok(())
    }

    /// Parse mvex, collecting trex defaults per track.
    fn parse_mvex(&mut self, mvex: &Atom, defaults: &mut HashMap<u32, TrackDefaults>) -> Result<()> {
        for child in self.read_children(mvex)? {
            if child.atom_type != AtomType::TREX {
                continue;
            }

            let data = self.read_atom_data(&child)?;
            if data.len() < 24 {
                return Err(Error::invalid_mp4("trex shorter than 24 bytes"));
            }

            let word = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
            defaults.insert(
                word(4),
                TrackDefaults {
                    sample_description_index: word(8),
                    sample_duration: word(12),
                    sample_size: word(16),
                    sample_flags: word(20),
                },
            );
        }

        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<TrackInfo> {
        let children = self.read_children(trak)?;

        let mut track = TrackInfo::new(0);

        for child in &children {
            match child.atom_type {
                AtomType::TKHD => self.parse_tkhd(child, &mut track)?,
                AtomType::MDIA => self.parse_mdia(child, &mut track)?,
                _ => {}
            }
        }

        if track.track_id == 0 {
            return Err(Error::MissingAtom("tkhd"));
        }

        Ok(track)
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        if data.is_empty() {
            return Ok(());
        }

        let version = data[0];

        if version == 0 {
            if data.len() >= 16 {
                track.track_id = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
            }
            if data.len() >= 84 {
                // Width and height at fixed point 16.16
                let w = u32::from_be_bytes([data[76], data[77], data[78], data[79]]);
                let h = u32::from_be_bytes([data[80], data[81], data[82], data[83]]);
                track.width = Some(w >> 16);
                track.height = Some(h >> 16);
            }
        } else {
            if data.len() >= 24 {
                track.track_id = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
            }
            if data.len() >= 96 {
                let w = u32::from_be_bytes([data[88], data[89], data[90], data[91]]);
                let h = u32::from_be_bytes([data[92], data[93], data[94], data[95]]);
                track.width = Some(w >> 16);
                track.height = Some(h >> 16);
            }
        }

        Ok(())
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(&mut self, mdia: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.read_children(mdia)?;

        // hdlr decides how stsd is read, so handle it before minf.
        for child in children.iter().filter(|c| c.atom_type == AtomType::HDLR) {
            self.parse_hdlr(child, track)?;
        }

        for child in &children {
            match child.atom_type {
                AtomType::MDHD => self.parse_mdhd(child, track)?,
                AtomType::MINF => self.parse_minf(child, track)?,
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        if data.is_empty() {
            return Ok(());
        }

        let version = data[0];

        if version == 0 {
            if data.len() >= 20 {
                track.timescale = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
                track.duration =
                    u32::from_be_bytes([data[16], data[17], data[18], data[19]]) as u64;
            }
        } else {
            if data.len() >= 24 {
                track.timescale = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
            }
            if data.len() >= 32 {
                track.duration = u64::from_be_bytes([
                    data[24], data[25], data[26], data[27], data[28], data[29], data[30], data[31],
                ]);
            }
        }

        if track.timescale == 0 {
            return Err(Error::invalid_mp4(format!(
                "track {} declares a zero timescale",
                track.track_id
            )));
        }

        Ok(())
    }

    /// Parse hdlr (handler) atom.
    fn parse_hdlr(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        if data.len() >= 12 {
            track.handler_type = HandlerType::from_bytes([data[8], data[9], data[10], data[11]]);
        }

        Ok(())
    }

    /// Parse minf (media info) atom.
    fn parse_minf(&mut self, minf: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.read_children(minf)?;

        for child in &children {
            if child.atom_type == AtomType::STBL {
                self.parse_stbl(child, track)?;
            }
        }

        Ok(())
    }

    /// Parse stbl; fragmented files only carry a meaningful stsd.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.read_children(stbl)?;

        for child in &children {
            if child.atom_type == AtomType::STSD {
                self.parse_stsd(child, track)?;
            }
        }

        Ok(())
    }

    /// Parse stsd (sample description) - extract codec config.
    fn parse_stsd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        if data.len() < 16 {
            return Ok(());
        }

        // version/flags (4), entry count (4), then the first sample entry
        track.sample_entry = Some(AtomType::from_bytes([data[12], data[13], data[14], data[15]]));

        if track.handler_type.is_audio() && data.len() >= 44 {
            // AudioSampleEntry layout (after stsd header[8] + box header[8] + SampleEntry[8]):
            // [24..26] version, [26..28] revision, [28..32] vendor
            // [32..34] channelCount, [34..36] sampleSize
            // [36..38] compressionID, [38..40] packetSize
            // [40..44] sampleRate (16.16 fixed-point)
            let channels = u16::from_be_bytes([data[32], data[33]]);
            let sample_rate = u32::from_be_bytes([data[40], data[41], data[42], data[43]]) >> 16;
            track.channels = Some(channels);
            track.sample_rate = Some(sample_rate);
            track.codec_data = find_config(&data, 44, &[b"esds", b"dOps"]);
        }

        if track.handler_type.is_video() && data.len() >= 94 {
            // VisualSampleEntry: width/height at [40..44], child boxes from 94
            track.width = Some(u16::from_be_bytes([data[40], data[41]]) as u32);
            track.height = Some(u16::from_be_bytes([data[42], data[43]]) as u32);
            track.codec_data = find_config(&data, 94, &[b"avcC", b"hvcC", b"av1C", b"vpcC"]);
        }

        Ok(())
    }
}

/// Scan child boxes of a sample entry for the first codec configuration box,
/// returning its contents without the box header.
fn find_config(data: &[u8], mut pos: usize, names: &[&[u8; 4]]) -> Option<Vec<u8>> {
    while pos + 8 <= data.len() {
        let box_size =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let box_type = &data[pos + 4..pos + 8];

        if box_size < 8 || pos + box_size > data.len() {
            break;
        }

        if names.iter().any(|n| box_type == &n[..]) {
            return Some(data[pos + 8..pos + box_size].to_vec());
        }

        pos += box_size;
    }

    None
}
