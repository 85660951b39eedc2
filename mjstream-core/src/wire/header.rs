//! Per-segment wire header.
//!
//! Every compressed tile travels as one binary message laid out as
//! `[80-byte header][JPEG bytes]`. The header is 10 little-endian
//! 64-bit floats:
//!
//! ```text
//! frame_id            f64 (integer-valued)
//! frame_time          f64 (ms, client clock)
//! bandwidth           f64 (Mbit/s, trailing window)
//! frame_rate          f64 (frames/s, trailing window)
//! render_duration     f64 (ms, window mean)
//! compress_duration   f64 (ms, window mean)
//! transmit_duration   f64 (ms, window mean)
//! frame_duration      f64 (ms, window mean)
//! segment_x           f64 (tile origin, px)
//! segment_y           f64 (tile origin, px)
//! ```
//!
//! Telemetry fields reflect the most recently *closed* statistics
//! window, not necessarily this exact frame's timings.

use crate::error::StreamError;

/// Fixed-layout record prepended to every compressed tile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SegmentHeader {
    pub frame_id: f64,
    pub frame_time: f64,
    pub bandwidth: f64,
    pub frame_rate: f64,
    pub render_duration: f64,
    pub compress_duration: f64,
    pub transmit_duration: f64,
    pub frame_duration: f64,
    pub segment_x: f64,
    pub segment_y: f64,
}

impl SegmentHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 10 * 8;

    /// Serialize into the first [`SIZE`](Self::SIZE) bytes of `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`SIZE`](Self::SIZE).
    pub fn encode_into(&self, dst: &mut [u8]) {
        let fields = [
            self.frame_id,
            self.frame_time,
            self.bandwidth,
            self.frame_rate,
            self.render_duration,
            self.compress_duration,
            self.transmit_duration,
            self.frame_duration,
            self.segment_x,
            self.segment_y,
        ];
        for (i, value) in fields.iter().enumerate() {
            dst[i * 8..(i + 1) * 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Serialize to a fixed array (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Deserialize from the first [`SIZE`](Self::SIZE) bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < Self::SIZE {
            return Err(StreamError::InvalidHeader("segment header too short"));
        }

        let mut fields = [0f64; 10];
        for (i, field) in fields.iter_mut().enumerate() {
            let bytes: [u8; 8] = data[i * 8..(i + 1) * 8]
                .try_into()
                .map_err(|_| StreamError::InvalidHeader("segment header truncated"))?;
            *field = f64::from_le_bytes(bytes);
        }

        let header = Self {
            frame_id: fields[0],
            frame_time: fields[1],
            bandwidth: fields[2],
            frame_rate: fields[3],
            render_duration: fields[4],
            compress_duration: fields[5],
            transmit_duration: fields[6],
            frame_duration: fields[7],
            segment_x: fields[8],
            segment_y: fields[9],
        };

        if !header.frame_id.is_finite() || header.frame_id < 0.0 {
            return Err(StreamError::InvalidHeader("frame id is not a valid index"));
        }

        Ok(header)
    }

    /// The frame id as an integer index.
    pub fn frame_index(&self) -> u64 {
        self.frame_id as u64
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let hdr = SegmentHeader {
            frame_id: 42.0,
            frame_time: 1234.5,
            bandwidth: 6.0,
            frame_rate: 59.7,
            render_duration: 2.5,
            compress_duration: 4.25,
            transmit_duration: 1.125,
            frame_duration: 9.0,
            segment_x: 640.0,
            segment_y: 360.0,
        };

        let encoded = hdr.encode();
        assert_eq!(encoded.len(), SegmentHeader::SIZE);

        let decoded = SegmentHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, hdr);
        assert_eq!(decoded.frame_index(), 42);
    }

    #[test]
    fn header_too_short() {
        let short = [0u8; SegmentHeader::SIZE - 1];
        assert!(SegmentHeader::decode(&short).is_err());
    }

    #[test]
    fn header_rejects_nonsense_frame_id() {
        let mut hdr = SegmentHeader::default();
        hdr.frame_id = f64::NAN;
        assert!(SegmentHeader::decode(&hdr.encode()).is_err());

        hdr.frame_id = -1.0;
        assert!(SegmentHeader::decode(&hdr.encode()).is_err());
    }

    #[test]
    fn decode_ignores_trailing_payload() {
        let hdr = SegmentHeader {
            frame_id: 7.0,
            ..Default::default()
        };
        let mut message = hdr.encode().to_vec();
        message.extend_from_slice(&[0xFF; 100]); // compressed bytes
        let decoded = SegmentHeader::decode(&message).unwrap();
        assert_eq!(decoded.frame_index(), 7);
    }
}
