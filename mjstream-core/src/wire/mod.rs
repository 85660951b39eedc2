//! Wire protocol: segment headers, control envelopes, stream framing.

pub mod codec;
pub mod control;
pub mod header;

pub use codec::{MAX_FRAME_SIZE, StreamCodec, WireFrame};
pub use control::{ControlMessage, MouseReport, Tick};
pub use header::SegmentHeader;
