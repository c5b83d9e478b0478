//! Movie fragment (moof) box builder.

use bytes::{BufMut, Bytes, BytesMut};

/// A sample to be written into a fragment.
#[derive(Debug, Clone)]
pub struct FragmentSample {
    /// Sample duration in media timescale.
    pub duration: u32,
    /// Composition time offset.
    pub cts_offset: i32,
    /// Whether this sample is a sync sample.
    pub is_keyframe: bool,
    /// Sample payload.
    pub data: Bytes,
}

/// Builder for moof + mdat pairs, one track per fragment.
pub struct MoofBuilder {
    sequence_number: u32,
    track_id: u32,
    base_media_decode_time: u64,
}

impl MoofBuilder {
    /// Create a new moof builder.
    pub fn new(sequence_number: u32, track_id: u32) -> Self {
        Self {
            sequence_number,
            track_id,
            base_media_decode_time: 0,
        }
    }

    /// Set base media decode time.
    pub fn base_media_decode_time(mut self, time: u64) -> Self {
        self.base_media_decode_time = time;
        self
    }

    /// Build the moof and mdat as two separate top-level atoms.
    pub fn build_atoms(&self, samples: &[FragmentSample]) -> (Bytes, Bytes) {
        let mut moof = BytesMut::with_capacity(256 + samples.len() * 16);
        self.write_moof(&mut moof, samples);

        let data_size: usize = samples.iter().map(|s| s.data.len()).sum();
        let mut mdat = BytesMut::with_capacity(8 + data_size);
        mdat.put_u32((data_size + 8) as u32);
        mdat.put_slice(b"mdat");
        for sample in samples {
            mdat.put_slice(&sample.data);
        }

        (moof.freeze(), mdat.freeze())
    }

    /// Build moof followed by its mdat in one buffer.
    pub fn build(&self, samples: &[FragmentSample]) -> Bytes {
        let (moof, mdat) = self.build_atoms(samples);
        let mut buf = BytesMut::with_capacity(moof.len() + mdat.len());
        buf.put_slice(&moof);
        buf.put_slice(&mdat);
        buf.freeze()
    }

    fn write_moof(&self, buf: &mut BytesMut, samples: &[FragmentSample]) {
        let moof_start = buf.len();
        buf.put_u32(0); // placeholder
        buf.put_slice(b"moof");

        // mfhd (movie fragment header)
        self.write_mfhd(buf);

        // traf (track fragment)
        self.write_traf(buf, samples);

        // Update moof size
        let moof_size = buf.len() - moof_start;
        let size_bytes = (moof_size as u32).to_be_bytes();
        buf[moof_start..moof_start + 4].copy_from_slice(&size_bytes);
    }

    fn write_mfhd(&self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_slice(b"mfhd");
        buf.put_u32(0); // version/flags
        buf.put_u32(self.sequence_number);
    }

    fn write_traf(&self, buf: &mut BytesMut, samples: &[FragmentSample]) {
        let traf_start = buf.len();
        buf.put_u32(0); // placeholder
        buf.put_slice(b"traf");

        self.write_tfhd(buf);
        self.write_tfdt(buf);
        self.write_trun(buf, samples);

        // Update traf size
        let traf_size = buf.len() - traf_start;
        let size_bytes = (traf_size as u32).to_be_bytes();
        buf[traf_start..traf_start + 4].copy_from_slice(&size_bytes);
    }

    fn write_tfhd(&self, buf: &mut BytesMut) {
        // Flags: default-base-is-moof (0x020000)
        buf.put_u32(16);
        buf.put_slice(b"tfhd");
        buf.put_u32(0x020000); // version 0, flags
        buf.put_u32(self.track_id);
    }

    fn write_tfdt(&self, buf: &mut BytesMut) {
        // Version 1 for 64-bit decode time
        buf.put_u32(20);
        buf.put_slice(b"tfdt");
        buf.put_u32(0x01000000); // version 1
        buf.put_u64(self.base_media_decode_time);
    }

    fn write_trun(&self, buf: &mut BytesMut, samples: &[FragmentSample]) {
        // Flags:
        // 0x000001: data-offset-present
        // 0x000100: sample-duration-present
        // 0x000200: sample-size-present
        // 0x000400: sample-flags-present
        // 0x000800: sample-composition-time-offset-present
        let flags = 0x000001 | 0x000100 | 0x000200 | 0x000400 | 0x000800;

        // full box header, sample_count, data_offset, then four fields per sample
        let size = 12 + 4 + 4 + samples.len() * 16;

        buf.put_u32(size as u32);
        buf.put_slice(b"trun");
        buf.put_u32(0x01000000 | flags); // version 1: signed composition offsets
        buf.put_u32(samples.len() as u32);

        // Data offset is fixed up once the moof size is known
        let data_offset_pos = buf.len();
        buf.put_u32(0);

        for sample in samples {
            buf.put_u32(sample.duration);
            buf.put_u32(sample.data.len() as u32);

            // Sample flags: sync sample = 0x02000000, non-sync = 0x01010000
            let sample_flags = if sample.is_keyframe {
                0x02000000u32
            } else {
                0x01010000u32
            };
            buf.put_u32(sample_flags);
            buf.put_i32(sample.cts_offset);
        }

        // trun is the last box of the only traf, so the moof ends here and
        // the sample data starts right after the 8-byte mdat header.
        let data_offset = (buf.len() + 8) as i32;
        buf[data_offset_pos..data_offset_pos + 4].copy_from_slice(&data_offset.to_be_bytes());
    }
}
