//! Fragmented MP4 (fMP4) reading and writing.
//!
//! - [`Fragment`] parses a `moof` and resolves its samples against the
//!   following `mdat`.
//! - [`InitSegmentBuilder`] and [`MoofBuilder`] serialize the same
//!   structures, producing the byte streams a WARP sender puts on the wire.

mod fragment;
mod moof;
mod sample;

pub use fragment::{Fragment, TrackFragment, TrackRun, TrunEntry};
pub use moof::{FragmentSample, MoofBuilder};
pub use sample::Sample;

use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone)]
struct VideoTrack {
    track_id: u32,
    timescale: u32,
    width: u32,
    height: u32,
    avcc: Vec<u8>,
}

#[derive(Debug, Clone)]
struct AudioTrack {
    track_id: u32,
    timescale: u32,
    channels: u16,
    sample_rate: u32,
    esds: Option<Vec<u8>>,
}

/// Builder for ftyp + moov initialization segments.
#[derive(Debug, Clone, Default)]
pub struct InitSegmentBuilder {
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
    default_sample_duration: u32,
}

impl InitSegmentBuilder {
    /// Create a new builder with no tracks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an H.264 video track.
    pub fn video(mut self, track_id: u32, timescale: u32, width: u32, height: u32, avcc: Vec<u8>) -> Self {
        self.video = Some(VideoTrack {
            track_id,
            timescale,
            width,
            height,
            avcc,
        });
        self
    }

    /// Add an AAC audio track.
    pub fn audio(
        mut self,
        track_id: u32,
        timescale: u32,
        channels: u16,
        sample_rate: u32,
        esds: Option<Vec<u8>>,
    ) -> Self {
        self.audio = Some(AudioTrack {
            track_id,
            timescale,
            channels,
            sample_rate,
            esds,
        });
        self
    }

    /// Default sample duration written into every trex.
    pub fn default_sample_duration(mut self, duration: u32) -> Self {
        self.default_sample_duration = duration;
        self
    }

    /// Build the init segment.
    pub fn build(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1024);

        self.write_ftyp(&mut buf);
        self.write_moov(&mut buf);

        buf.freeze()
    }

    fn write_ftyp(&self, buf: &mut BytesMut) {
        // ftyp: isom, iso5, dash, mp42
        let brands = [b"isom", b"iso5", b"dash", b"mp42"];
        let size = 8 + 4 + 4 + brands.len() * 4;

        buf.put_u32(size as u32);
        buf.put_slice(b"ftyp");
        buf.put_slice(b"iso5"); // major brand
        buf.put_u32(0x200); // minor version
        for brand in &brands {
            buf.put_slice(*brand);
        }
    }

    fn write_moov(&self, buf: &mut BytesMut) {
        let moov_start = open_box(buf, b"moov");

        let timescale = self
            .video
            .as_ref()
            .map(|v| v.timescale)
            .or(self.audio.as_ref().map(|a| a.timescale))
            .unwrap_or(1000);
        self.write_mvhd(buf, timescale);

        if let Some(video) = &self.video {
            let trak = open_box(buf, b"trak");
            write_tkhd(buf, video.track_id, Some((video.width, video.height)));
            let mdia = open_box(buf, b"mdia");
            write_mdhd(buf, video.timescale);
            write_hdlr(buf, b"vide", b"VideoHandler");
            let minf = open_box(buf, b"minf");
            // vmhd
            buf.put_u32(20);
            buf.put_slice(b"vmhd");
            buf.put_u32(1); // version/flags
            buf.put_u64(0); // graphics mode + opcolor
            write_dinf(buf);
            let stbl = open_box(buf, b"stbl");
            write_video_stsd(buf, video);
            write_empty_tables(buf);
            close_box(buf, stbl);
            close_box(buf, minf);
            close_box(buf, mdia);
            close_box(buf, trak);
        }

        if let Some(audio) = &self.audio {
            let trak = open_box(buf, b"trak");
            write_tkhd(buf, audio.track_id, None);
            let mdia = open_box(buf, b"mdia");
            write_mdhd(buf, audio.timescale);
            write_hdlr(buf, b"soun", b"SoundHandler");
            let minf = open_box(buf, b"minf");
            // smhd
            buf.put_u32(16);
            buf.put_slice(b"smhd");
            buf.put_u32(0); // version/flags
            buf.put_u32(0); // balance + reserved
            write_dinf(buf);
            let stbl = open_box(buf, b"stbl");
            write_audio_stsd(buf, audio);
            write_empty_tables(buf);
            close_box(buf, stbl);
            close_box(buf, minf);
            close_box(buf, mdia);
            close_box(buf, trak);
        }

        // mvex (movie extends for fragmented)
        let mvex = open_box(buf, b"mvex");
        for track_id in self
            .video
            .iter()
            .map(|v| v.track_id)
            .chain(self.audio.iter().map(|a| a.track_id))
        {
            buf.put_u32(32);
            buf.put_slice(b"trex");
            buf.put_u32(0); // version/flags
            buf.put_u32(track_id);
            buf.put_u32(1); // default sample description index
            buf.put_u32(self.default_sample_duration);
            buf.put_u32(0); // default sample size
            buf.put_u32(0); // default sample flags
        }
        close_box(buf, mvex);

        close_box(buf, moov_start);
    }

    fn write_mvhd(&self, buf: &mut BytesMut, timescale: u32) {
        buf.put_u32(120); // version 1
        buf.put_slice(b"mvhd");
        buf.put_u8(1); // version 1
        buf.put_slice(&[0, 0, 0]); // flags
        buf.put_u64(0); // creation time
        buf.put_u64(0); // modification time
        buf.put_u32(timescale);
        buf.put_u64(0); // duration unknown for live
        buf.put_u32(0x00010000); // rate = 1.0
        buf.put_u16(0x0100); // volume = 1.0
        buf.put_u16(0); // reserved
        buf.put_u64(0); // reserved
        write_matrix(buf);
        // Pre-defined (6 * 4 bytes)
        for _ in 0..6 {
            buf.put_u32(0);
        }
        buf.put_u32(u32::MAX); // next track ID
    }
}

/// Write a placeholder box header, returning the offset to patch later.
fn open_box(buf: &mut BytesMut, name: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(name);
    start
}

/// Patch the size of a box opened with [`open_box`].
fn close_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn write_matrix(buf: &mut BytesMut) {
    // Identity
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

fn write_tkhd(buf: &mut BytesMut, track_id: u32, dimensions: Option<(u32, u32)>) {
    buf.put_u32(104); // version 1
    buf.put_slice(b"tkhd");
    buf.put_u8(1);
    buf.put_slice(&[0, 0, 7]); // flags: enabled, in_movie, in_preview
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(track_id);
    buf.put_u32(0); // reserved
    buf.put_u64(0); // duration
    buf.put_u64(0); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(if dimensions.is_some() { 0 } else { 0x0100 }); // volume
    buf.put_u16(0); // reserved
    write_matrix(buf);
    let (width, height) = dimensions.unwrap_or((0, 0));
    buf.put_u32(width << 16);
    buf.put_u32(height << 16);
}

fn write_mdhd(buf: &mut BytesMut, timescale: u32) {
    buf.put_u32(44); // version 1
    buf.put_slice(b"mdhd");
    buf.put_u8(1);
    buf.put_slice(&[0, 0, 0]); // flags
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(timescale);
    buf.put_u64(0); // duration
    buf.put_u16(0x55C4); // language: und
    buf.put_u16(0); // pre_defined
}

fn write_hdlr(buf: &mut BytesMut, handler: &[u8; 4], name: &[u8]) {
    let size = 32 + name.len() + 1;
    buf.put_u32(size as u32);
    buf.put_slice(b"hdlr");
    buf.put_u32(0); // version/flags
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler);
    buf.put_u32(0); // reserved
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_slice(name);
    buf.put_u8(0); // null terminator
}

fn write_dinf(buf: &mut BytesMut) {
    buf.put_u32(36);
    buf.put_slice(b"dinf");

    // dref
    buf.put_u32(28);
    buf.put_slice(b"dref");
    buf.put_u32(0); // version/flags
    buf.put_u32(1); // entry count

    // url (self-reference)
    buf.put_u32(12);
    buf.put_slice(b"url ");
    buf.put_u32(1); // flags: self-contained
}

fn write_video_stsd(buf: &mut BytesMut, video: &VideoTrack) {
    let stsd = open_box(buf, b"stsd");
    buf.put_u32(0); // version/flags
    buf.put_u32(1); // entry count

    let avc1 = open_box(buf, b"avc1");
    buf.put_slice(&[0; 6]); // reserved
    buf.put_u16(1); // data reference index
    buf.put_u16(0); // pre_defined
    buf.put_u16(0); // reserved
    buf.put_slice(&[0; 12]); // pre_defined
    buf.put_u16(video.width as u16);
    buf.put_u16(video.height as u16);
    buf.put_u32(0x00480000); // horiz resolution 72 dpi
    buf.put_u32(0x00480000); // vert resolution 72 dpi
    buf.put_u32(0); // reserved
    buf.put_u16(1); // frame count
    buf.put_slice(&[0; 32]); // compressor name
    buf.put_u16(0x0018); // depth
    buf.put_i16(-1); // pre_defined

    buf.put_u32((8 + video.avcc.len()) as u32);
    buf.put_slice(b"avcC");
    buf.put_slice(&video.avcc);

    close_box(buf, avc1);
    close_box(buf, stsd);
}

fn write_audio_stsd(buf: &mut BytesMut, audio: &AudioTrack) {
    let stsd = open_box(buf, b"stsd");
    buf.put_u32(0); // version/flags
    buf.put_u32(1); // entry count

    let mp4a = open_box(buf, b"mp4a");
    buf.put_slice(&[0; 6]); // reserved
    buf.put_u16(1); // data reference index
    buf.put_u32(0); // reserved
    buf.put_u32(0); // reserved
    buf.put_u16(audio.channels);
    buf.put_u16(16); // sample size
    buf.put_u16(0); // pre_defined
    buf.put_u16(0); // reserved
    buf.put_u32(audio.sample_rate << 16);

    if let Some(esds) = &audio.esds {
        buf.put_u32((8 + esds.len()) as u32);
        buf.put_slice(b"esds");
        buf.put_slice(esds);
    }

    close_box(buf, mp4a);
    close_box(buf, stsd);
}

fn write_empty_tables(buf: &mut BytesMut) {
    for name in [b"stts", b"stsc", b"stco"] {
        buf.put_u32(16);
        buf.put_slice(name);
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // entry count
    }

    buf.put_u32(20);
    buf.put_slice(b"stsz");
    buf.put_u32(0); // version/flags
    buf.put_u32(0); // sample size
    buf.put_u32(0); // sample count
}
