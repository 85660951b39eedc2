//! The server-side frame pipeline.
//!
//! One frame's journey: the scheduler admits a tick, builds a
//! [`FrameRequest`] chained behind the previously accepted frame, and
//! posts it to a worker. The worker renders, compresses the tile grid
//! in parallel, waits on the predecessor's transmitted gate, and sends
//! the frame's segments. Render and compression of different frames
//! overlap across workers; only transmission is serialized, which keeps
//! the wire in strict admission order.

pub mod compressor;
pub mod request;
pub mod scheduler;
pub mod signal;
pub mod worker;

pub use compressor::{DEFAULT_QUALITY, SegmentCompressor};
pub use request::FrameRequest;
pub use scheduler::{DispatchOutcome, FrameScheduler};
pub use signal::{StageCell, StageGate, StageState};
pub use worker::{FrameWorker, WorkerShared};
