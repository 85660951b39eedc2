//! Message framing for the duplex stream channel.
//!
//! The transport is an ordered, reliable, message-based channel carrying
//! both text (control) and binary (tile) frames over a single TCP
//! stream:
//!
//! ```text
//! length:   u32  (payload bytes, little-endian)
//! kind:     u8   (0 = text, 1 = binary)
//! payload:  [u8; length]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;

/// Hard cap on a single message, header included. A 2×2 tile of a
/// 1080p frame compresses far below this even at quality 100.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

const PREFIX_SIZE: usize = 4 + 1;

const KIND_TEXT: u8 = 0;
const KIND_BINARY: u8 = 1;

// ── WireFrame ────────────────────────────────────────────────────

/// One framed message on the stream channel.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    /// A UTF-8 control message (JSON envelope).
    Text(String),
    /// A compressed tile: `[SegmentHeader][JPEG bytes]`.
    Binary(Bytes),
}

impl WireFrame {
    /// Payload length in bytes (excluding the 5-byte frame prefix).
    pub fn payload_len(&self) -> usize {
        match self {
            WireFrame::Text(s) => s.len(),
            WireFrame::Binary(b) => b.len(),
        }
    }

    /// Total bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        PREFIX_SIZE + self.payload_len()
    }
}

// ── StreamCodec ──────────────────────────────────────────────────

/// `tokio_util` codec turning a byte stream into [`WireFrame`]s.
#[derive(Debug, Default)]
pub struct StreamCodec;

impl Decoder for StreamCodec {
    type Item = WireFrame;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PREFIX_SIZE {
            return Ok(None);
        }

        let length = u32::from_le_bytes(src[0..4].try_into().expect("4-byte slice")) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(StreamError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }

        if src.len() < PREFIX_SIZE + length {
            src.reserve(PREFIX_SIZE + length - src.len());
            return Ok(None);
        }

        let kind = src[4];
        src.advance(PREFIX_SIZE);
        let payload = src.split_to(length).freeze();

        match kind {
            KIND_TEXT => {
                let text = String::from_utf8(payload.to_vec())?;
                Ok(Some(WireFrame::Text(text)))
            }
            KIND_BINARY => Ok(Some(WireFrame::Binary(payload))),
            _ => Err(StreamError::ProtocolViolation("unknown frame kind")),
        }
    }
}

impl Encoder<WireFrame> for StreamCodec {
    type Error = StreamError;

    fn encode(&mut self, item: WireFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.payload_len();
        if len > MAX_FRAME_SIZE {
            return Err(StreamError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(PREFIX_SIZE + len);
        dst.put_u32_le(len as u32);
        match item {
            WireFrame::Text(s) => {
                dst.put_u8(KIND_TEXT);
                dst.put_slice(s.as_bytes());
            }
            WireFrame::Binary(b) => {
                dst.put_u8(KIND_BINARY);
                dst.put_slice(&b);
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: WireFrame) -> BytesMut {
        let mut buf = BytesMut::new();
        StreamCodec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn text_frame_roundtrip() {
        let mut buf = encode(WireFrame::Text("{\"action\":\"READY\"}".into()));
        let decoded = StreamCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, WireFrame::Text("{\"action\":\"READY\"}".into()));
        assert!(buf.is_empty());
    }

    #[test]
    fn binary_frame_roundtrip() {
        let payload = Bytes::from(vec![0xAB; 500]);
        let mut buf = encode(WireFrame::Binary(payload.clone()));
        let decoded = StreamCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, WireFrame::Binary(payload));
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let full = encode(WireFrame::Binary(Bytes::from(vec![1, 2, 3, 4])));
        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        assert!(StreamCodec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[full.len() - 2..]);
        assert!(StreamCodec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = encode(WireFrame::Text("a".into()));
        buf.unsplit(encode(WireFrame::Binary(Bytes::from_static(b"bb"))));

        assert_eq!(
            StreamCodec.decode(&mut buf).unwrap().unwrap(),
            WireFrame::Text("a".into())
        );
        assert_eq!(
            StreamCodec.decode(&mut buf).unwrap().unwrap(),
            WireFrame::Binary(Bytes::from_static(b"bb"))
        );
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le((MAX_FRAME_SIZE + 1) as u32);
        buf.put_u8(KIND_BINARY);
        assert!(matches!(
            StreamCodec.decode(&mut buf),
            Err(StreamError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_protocol_violation() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(1);
        buf.put_u8(7);
        buf.put_u8(0);
        assert!(matches!(
            StreamCodec.decode(&mut buf),
            Err(StreamError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(2);
        buf.put_u8(KIND_TEXT);
        buf.put_slice(&[0xFF, 0xFE]);
        assert!(matches!(
            StreamCodec.decode(&mut buf),
            Err(StreamError::InvalidUtf8(_))
        ));
    }
}
