use bytes::Bytes;

/// One decoded sample (frame) resolved from a moof + mdat pair.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Sample {
    /// Track the sample belongs to.
    pub track_id: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Sample duration in media timescale.
    pub duration: u32,
    /// Composition time offset (for PTS calculation).
    pub cts_offset: i32,
    /// Media timescale of the owning track.
    pub timescale: u32,
    /// Whether this sample is a keyframe (sync sample).
    pub is_keyframe: bool,
    /// Sample payload.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub data: Bytes,
}

impl Sample {
    /// Get the presentation timestamp in media timescale.
    pub fn pts(&self) -> u64 {
        (self.dts as i64 + self.cts_offset as i64).max(0) as u64
    }

    /// Presentation timestamp in seconds.
    pub fn pts_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.pts() as f64 / self.timescale as f64
        }
    }

    /// Decode timestamp in seconds.
    pub fn dts_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.dts as f64 / self.timescale as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dts: u64, cts_offset: i32, timescale: u32) -> Sample {
        Sample {
            track_id: 1,
            dts,
            duration: 1000,
            cts_offset,
            timescale,
            is_keyframe: false,
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_pts_with_negative_offset_clamps() {
        assert_eq!(sample(100, -200, 1000).pts(), 0);
        assert_eq!(sample(1000, 500, 1000).pts(), 1500);
    }

    #[test]
    fn test_seconds() {
        let s = sample(90000, 3000, 90000);
        assert!((s.dts_secs() - 1.0).abs() < 1e-9);
        assert!((s.pts_secs() - 90000.0f64.recip() * 93000.0).abs() < 1e-9);
        assert_eq!(sample(10, 0, 0).pts_secs(), 0.0);
    }
}
