//! Movie fragment (moof) parsing.
//!
//! A live fragment is a `moof` immediately followed by its `mdat`. Sample
//! timing comes from `tfdt` and `trun`, falling back to `tfhd` and then the
//! init segment's `trex` defaults. Offsets are resolved relative to the start
//! of the `moof`, which is how live packagers write them.

use super::Sample;
use crate::mp4::{children, read_u32, read_u64, Atom, AtomType, InitInfo};
use crate::{Error, Result};
use bytes::Bytes;

// tfhd flags
const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
const TFHD_DEFAULT_DURATION: u32 = 0x000008;
const TFHD_DEFAULT_SIZE: u32 = 0x000010;
const TFHD_DEFAULT_FLAGS: u32 = 0x000020;

// trun flags
const TRUN_DATA_OFFSET: u32 = 0x000001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_DURATION: u32 = 0x000100;
const TRUN_SIZE: u32 = 0x000200;
const TRUN_FLAGS: u32 = 0x000400;
const TRUN_CTS_OFFSET: u32 = 0x000800;

/// `sample_is_non_sync_sample` bit of the sample flags.
const SAMPLE_NON_SYNC: u32 = 0x0001_0000;

/// A parsed `moof`.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Sequence number from mfhd.
    pub sequence_number: u32,
    /// Size of the moof atom including its header.
    pub size: u64,
    /// One entry per traf.
    pub tracks: Vec<TrackFragment>,
}

/// A parsed `traf`.
#[derive(Debug, Clone, Default)]
pub struct TrackFragment {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    /// Decode time of the first sample, from tfdt.
    pub base_decode_time: Option<u64>,
    pub runs: Vec<TrackRun>,
}

/// A parsed `trun`.
#[derive(Debug, Clone, Default)]
pub struct TrackRun {
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub entries: Vec<TrunEntry>,
}

/// One sample record of a `trun`; absent fields fall back to defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrunEntry {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub cts_offset: i32,
}

impl Fragment {
    /// Parse a complete `moof` atom, header included.
    pub fn parse(moof: &[u8]) -> Result<Self> {
        let atom = Atom::peek(moof)?.ok_or(Error::truncated(8, moof.len()))?;

        if atom.atom_type != AtomType::MOOF {
            return Err(Error::invalid_mp4(format!(
                "expected moof, found {}",
                atom.atom_type
            )));
        }
        if atom.size != moof.len() as u64 {
            return Err(Error::invalid_mp4(format!(
                "moof declares {} bytes but {} were given",
                atom.size,
                moof.len()
            )));
        }

        let mut fragment = Fragment {
            sequence_number: 0,
            size: atom.size,
            tracks: Vec::new(),
        };

        for (kind, payload) in children(&moof[atom.header_size as usize..])? {
            match kind {
                AtomType::MFHD => fragment.sequence_number = read_u32(payload, 4)?,
                AtomType::TRAF => fragment.tracks.push(parse_traf(payload)?),
                _ => {}
            }
        }

        if fragment.tracks.is_empty() {
            return Err(Error::MissingAtom("traf"));
        }

        Ok(fragment)
    }

    /// Total number of samples described by the fragment.
    pub fn sample_count(&self) -> usize {
        self.tracks
            .iter()
            .flat_map(|t| t.runs.iter())
            .map(|r| r.entries.len())
            .sum()
    }

    /// Resolve samples against the `mdat` that directly follows this moof.
    ///
    /// `mdat` is the whole atom, header included. Payloads are zero-copy
    /// slices of it.
    pub fn samples(&self, mdat: &Bytes, init: &InitInfo) -> Result<Vec<Sample>> {
        let header = Atom::peek(mdat)?.ok_or(Error::truncated(8, mdat.len()))?;
        if header.atom_type != AtomType::MDAT {
            return Err(Error::invalid_mp4(format!(
                "expected mdat, found {}",
                header.atom_type
            )));
        }

        let payload = mdat.slice(header.header_size as usize..);
        let payload_start = self.size as i64 + header.header_size as i64;

        let mut out = Vec::with_capacity(self.sample_count());
        let mut cursor = payload_start;

        for traf in &self.tracks {
            if traf.base_data_offset.is_some() {
                return Err(Error::unsupported(
                    "explicit base-data-offset in a live fragment",
                ));
            }

            let track = init
                .track(traf.track_id)
                .ok_or(Error::UnknownTrack(traf.track_id))?;
            let defaults = &track.defaults;

            let mut dts = traf.base_decode_time.unwrap_or(0);

            for run in &traf.runs {
                if let Some(offset) = run.data_offset {
                    cursor = offset as i64;
                }

                for (i, entry) in run.entries.iter().enumerate() {
                    let duration = entry
                        .duration
                        .or(traf.default_sample_duration)
                        .unwrap_or(defaults.sample_duration);
                    let size = entry
                        .size
                        .or(traf.default_sample_size)
                        .unwrap_or(defaults.sample_size) as i64;
                    let flags = if i == 0 { run.first_sample_flags } else { None }
                        .or(entry.flags)
                        .or(traf.default_sample_flags)
                        .unwrap_or(defaults.sample_flags);

                    let start = cursor - payload_start;
                    let end = start + size;
                    if start < 0 || end > payload.len() as i64 {
                        return Err(Error::truncated(end.max(0) as usize, payload.len()));
                    }

                    out.push(Sample {
                        track_id: traf.track_id,
                        dts,
                        duration,
                        cts_offset: entry.cts_offset,
                        timescale: track.timescale,
                        is_keyframe: flags & SAMPLE_NON_SYNC == 0,
                        data: payload.slice(start as usize..end as usize),
                    });

                    dts = dts.checked_add(duration as u64).ok_or_else(|| {
                        Error::invalid_mp4(format!(
                            "decode time of track {} overflows",
                            traf.track_id
                        ))
                    })?;
                    cursor += size;
                }
            }
        }

        Ok(out)
    }
}

fn parse_traf(data: &[u8]) -> Result<TrackFragment> {
    let mut traf = TrackFragment::default();
    let mut saw_tfhd = false;

    for (kind, payload) in children(data)? {
        match kind {
            AtomType::TFHD => {
                parse_tfhd(payload, &mut traf)?;
                saw_tfhd = true;
            }
            AtomType::TFDT => {
                let version = *payload.first().ok_or(Error::truncated(1, 0))?;
                traf.base_decode_time = Some(if version == 1 {
                    read_u64(payload, 4)?
                } else {
                    read_u32(payload, 4)? as u64
                });
            }
            AtomType::TRUN => traf.runs.push(parse_trun(payload)?),
            _ => {}
        }
    }

    if !saw_tfhd {
        return Err(Error::MissingAtom("tfhd"));
    }

    Ok(traf)
}

fn parse_tfhd(data: &[u8], traf: &mut TrackFragment) -> Result<()> {
    let flags = read_u32(data, 0)? & 0x00ff_ffff;
    traf.track_id = read_u32(data, 4)?;

    let mut pos = 8;
    if flags & TFHD_BASE_DATA_OFFSET != 0 {
        traf.base_data_offset = Some(read_u64(data, pos)?);
        pos += 8;
    }
    if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
        traf.sample_description_index = Some(read_u32(data, pos)?);
        pos += 4;
    }
    if flags & TFHD_DEFAULT_DURATION != 0 {
        traf.default_sample_duration = Some(read_u32(data, pos)?);
        pos += 4;
    }
    if flags & TFHD_DEFAULT_SIZE != 0 {
        traf.default_sample_size = Some(read_u32(data, pos)?);
        pos += 4;
    }
    if flags & TFHD_DEFAULT_FLAGS != 0 {
        traf.default_sample_flags = Some(read_u32(data, pos)?);
    }

    Ok(())
}

fn parse_trun(data: &[u8]) -> Result<TrackRun> {
    let flags = read_u32(data, 0)? & 0x00ff_ffff;
    let count = read_u32(data, 4)? as usize;

    let mut run = TrackRun::default();
    let mut pos = 8;

    if flags & TRUN_DATA_OFFSET != 0 {
        run.data_offset = Some(read_u32(data, pos)? as i32);
        pos += 4;
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        run.first_sample_flags = Some(read_u32(data, pos)?);
        pos += 4;
    }

    let per_sample = [TRUN_DURATION, TRUN_SIZE, TRUN_FLAGS, TRUN_CTS_OFFSET]
        .iter()
        .filter(|f| flags & **f != 0)
        .count()
        * 4;

    // Reject counts the payload cannot hold before allocating for them.
    let need = pos + count * per_sample;
    if need > data.len() {
        return Err(Error::BufferUnderflow {
            need,
            have: data.len(),
        });
    }

    run.entries.reserve(count);
    for _ in 0..count {
        let mut entry = TrunEntry::default();
        if flags & TRUN_DURATION != 0 {
            entry.duration = Some(read_u32(data, pos)?);
            pos += 4;
        }
        if flags & TRUN_SIZE != 0 {
            entry.size = Some(read_u32(data, pos)?);
            pos += 4;
        }
        if flags & TRUN_FLAGS != 0 {
            entry.flags = Some(read_u32(data, pos)?);
            pos += 4;
        }
        if flags & TRUN_CTS_OFFSET != 0 {
            entry.cts_offset = read_u32(data, pos)? as i32;
            pos += 4;
        }
        run.entries.push(entry);
    }

    Ok(run)
}
