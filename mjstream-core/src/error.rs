//! Domain-specific error types for the streaming pipeline.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! Tick drops (worker busy, stale timestamp) are *policy*, not errors —
//! they are reported through [`crate::pipeline::DispatchOutcome`] instead.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the streaming pipeline.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A message violated protocol rules; the connection is closed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A segment header could not be parsed.
    #[error("invalid segment header: {0}")]
    InvalidHeader(&'static str),

    /// An incoming frame exceeds the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Pipeline Errors ──────────────────────────────────────────
    /// Tile compression or decompression failed. Fatal to that tile's
    /// frame, not to the pipeline.
    #[error("codec failure: {0}")]
    Codec(String),

    /// A send failed mid-frame. Fatal to that frame; the frame's
    /// transmitted gate is released through the failure path so that
    /// successors are never starved.
    #[error("transmit failure: {0}")]
    Transmit(String),

    /// The scheduler has no live workers left to dispatch to.
    #[error("all frame workers have terminated")]
    WorkersExhausted,

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation was cancelled via the shutdown token.
    #[error("operation cancelled")]
    Cancelled,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The outbound buffer is over the backpressure threshold; the tick
    /// was refused rather than queued.
    #[error("server busy: {buffered} bytes pending")]
    ServerBusy { buffered: u64 },

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a control message failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

// ── Convenient From implementations ──────────────────────────────

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Encoding(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StreamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        StreamError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for StreamError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            StreamError::Cancelled
        } else {
            StreamError::Codec(format!("worker task panicked: {e}"))
        }
    }
}
