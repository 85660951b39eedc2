//! # mjstream-core
//!
//! Core library for the motion-JPEG latency streaming pipeline.
//!
//! This crate contains:
//! - **Wire**: `SegmentHeader`, the JSON control envelope, and
//!   `StreamCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `StreamConnection` with a buffered-bytes gauge behind
//!   the `FrameSink` trait
//! - **Pipeline**: scheduler, workers, stage gates, and the parallel
//!   tile compressor — wire order always equals admission order
//! - **Stats**: `FrameStats`, the 30-frame trailing telemetry window
//! - **Render**: the `Renderer` seam plus the synthetic clock animation
//! - **Jpeg**: the `TileCodec` seam over the `image` crate
//! - **Client**: `JitterBuffer` reassembly and the headless `ViewClient`
//! - **Session**: `RenderSession`, one per connected viewer
//! - **Error**: `StreamError` — typed, `thiserror`-based error hierarchy

pub mod client;
pub mod error;
pub mod jitter;
pub mod jpeg;
pub mod net;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod spec;
pub mod stats;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{AssembledFrame, BUSY_THRESHOLD, ViewClient};
pub use error::StreamError;
pub use jitter::{DecodedSegment, JitterBuffer, JitterEvent};
pub use jpeg::{JpegCodec, TileCodec};
pub use net::{FrameSink, StreamConnection, StreamSender};
pub use pipeline::{
    DispatchOutcome, FrameRequest, FrameScheduler, FrameWorker, SegmentCompressor, StageGate,
    StageState, WorkerShared,
};
pub use render::{ClockRenderer, PixelFormat, RasterFrame, RasterView, Renderer, load_background};
pub use session::{RenderSession, SessionConfig};
pub use spec::{FrameSpec, SEGMENTS_PER_FRAME, TileRect};
pub use stats::{FrameStats, STATS_WINDOW};
pub use wire::{ControlMessage, MAX_FRAME_SIZE, SegmentHeader, StreamCodec, Tick, WireFrame};
