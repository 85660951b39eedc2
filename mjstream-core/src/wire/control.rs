//! Text control channel: JSON `{action, payload}` envelopes.
//!
//! Server → client: `READY` (once, after setup) carrying the
//! [`FrameSpec`]. Client → server: `TICK` requesting a frame at a given
//! animation time, and `MOUSE` position reports.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::spec::FrameSpec;

// ── Payloads ─────────────────────────────────────────────────────

/// A timestamped request for a new frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    /// Client-assigned, monotonically increasing frame index.
    pub frame_id: u64,
    /// Client animation clock at request time, in milliseconds.
    pub frame_time: f64,
    /// Clock-hand animation time, in milliseconds.
    pub circle_time: f64,
}

/// A pointer event relative to the frame center.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MouseReport {
    /// 1 = press, 0 = move, -1 = release.
    pub kind: i32,
    pub pos_x: f64,
    pub pos_y: f64,
}

// ── Envelope ─────────────────────────────────────────────────────

/// A control-channel message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "payload")]
pub enum ControlMessage {
    #[serde(rename = "READY")]
    Ready(FrameSpec),
    #[serde(rename = "TICK")]
    Tick(Tick),
    #[serde(rename = "MOUSE")]
    Mouse(MouseReport),
}

impl ControlMessage {
    /// Serialize to the wire text form.
    pub fn to_json(&self) -> Result<String, StreamError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a wire text message.
    pub fn from_json(text: &str) -> Result<Self, StreamError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_envelope_shape() {
        let msg = ControlMessage::Tick(Tick {
            frame_id: 12,
            frame_time: 203.5,
            circle_time: 203.5,
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""action":"TICK""#));
        assert!(json.contains(r#""frameId":12"#));
        assert!(json.contains("frameTime"));

        let parsed = ControlMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn ready_envelope_roundtrip() {
        let msg = ControlMessage::Ready(FrameSpec::new(1280, 720, 1));
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""action":"READY""#));

        match ControlMessage::from_json(&json).unwrap() {
            ControlMessage::Ready(spec) => assert_eq!(spec.width, 1280),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_client_formatted_tick() {
        // As emitted by a JS client: field order differs, extra spacing.
        let json = r#"{ "action": "TICK", "payload": { "frameTime": 16.6, "circleTime": 16.6, "frameId": 1 } }"#;
        match ControlMessage::from_json(json).unwrap() {
            ControlMessage::Tick(t) => {
                assert_eq!(t.frame_id, 1);
                assert!((t.frame_time - 16.6).abs() < 1e-9);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_action() {
        let json = r#"{"action":"NOPE","payload":{}}"#;
        assert!(matches!(
            ControlMessage::from_json(json),
            Err(StreamError::Encoding(_))
        ));
    }
}
