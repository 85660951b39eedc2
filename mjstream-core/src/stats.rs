//! Windowed frame telemetry.
//!
//! [`FrameStats`] accumulates per-stage durations and compressed byte
//! counts, and closes a window every [`STATS_WINDOW`] updates. The
//! snapshot returned by [`update`](FrameStats::update) always carries
//! the *previous* closed window's averages — exposed metrics are a
//! trailing window, not instantaneous values.

use std::sync::Mutex;
use std::time::Duration;

use crate::wire::SegmentHeader;

/// Updates per statistics window.
pub const STATS_WINDOW: u32 = 30;

// ── FrameStats ───────────────────────────────────────────────────

/// Shared, lock-protected telemetry aggregator.
///
/// All pipeline stages of all workers feed the same instance; a single
/// mutex guards every mutation.
#[derive(Debug, Default)]
pub struct FrameStats {
    inner: Mutex<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    /// Last closed window's results, re-stamped with the current frame
    /// on every update.
    header: SegmentHeader,

    window_start_ms: f64,
    frame_count: u32,
    byte_count: u64,

    render_ms: f64,
    compress_ms: f64,
    transmit_ms: f64,
    frame_ms: f64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame admission and return the current snapshot.
    ///
    /// On the [`STATS_WINDOW`]th call since the last reset this closes
    /// the window: frame rate and bandwidth are derived from the span
    /// between the window's first and last `frame_time`, stage means
    /// from the accumulated sums, and all accumulators reset.
    pub fn update(&self, frame_id: u64, frame_time_ms: f64) -> SegmentHeader {
        let mut inner = self.inner.lock().expect("stats lock poisoned");

        inner.header.frame_id = frame_id as f64;
        inner.header.frame_time = frame_time_ms;

        inner.frame_count += 1;
        if inner.frame_count == STATS_WINDOW {
            let elapsed_s = (frame_time_ms - inner.window_start_ms) / 1000.0;
            let count = f64::from(STATS_WINDOW);

            inner.header.frame_rate = count / elapsed_s;
            // Roughly 10 bits per byte on the wire; result in Mbit/s.
            inner.header.bandwidth = (inner.byte_count as f64 / elapsed_s) * 10.0 / 1e6;
            inner.header.render_duration = inner.render_ms / count;
            inner.header.compress_duration = inner.compress_ms / count;
            inner.header.transmit_duration = inner.transmit_ms / count;
            inner.header.frame_duration = inner.frame_ms / count;

            inner.render_ms = 0.0;
            inner.compress_ms = 0.0;
            inner.transmit_ms = 0.0;
            inner.frame_ms = 0.0;
            inner.byte_count = 0;
            inner.frame_count = 0;
            inner.window_start_ms = frame_time_ms;
        }

        inner.header
    }

    /// Record the compressed size of one transmitted segment.
    pub fn add_compressed_size(&self, bytes: usize) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        inner.byte_count += bytes as u64;
    }

    pub fn add_render_duration(&self, d: Duration) {
        self.inner.lock().expect("stats lock poisoned").render_ms += as_ms(d);
    }

    pub fn add_compress_duration(&self, d: Duration) {
        self.inner.lock().expect("stats lock poisoned").compress_ms += as_ms(d);
    }

    pub fn add_transmit_duration(&self, d: Duration) {
        self.inner.lock().expect("stats lock poisoned").transmit_ms += as_ms(d);
    }

    pub fn add_frame_duration(&self, d: Duration) {
        self.inner.lock().expect("stats lock poisoned").frame_ms += as_ms(d);
    }

    /// The last closed window's results without recording an update.
    pub fn snapshot(&self) -> SegmentHeader {
        self.inner.lock().expect("stats lock poisoned").header
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

// ── Tests ────────────────────────────────────────────────────────
