//! Tick admission and worker rotation.
//!
//! The scheduler is the single point where client ticks become frames.
//! It enforces the monotonic animation clock, rotates over the worker
//! pool, and links every accepted frame behind the previously accepted
//! one — the ordering chain the workers' transmit stage waits on.
//!
//! Backpressure is drop-based: when the worker at the rotation pointer
//! is still busy, the tick is discarded on the spot. Nothing is ever
//! queued, so a slow pipeline sheds frames instead of adding latency.

use tracing::debug;

use crate::error::StreamError;
use crate::pipeline::request::FrameRequest;
use crate::pipeline::signal::StageGate;
use crate::pipeline::worker::FrameWorker;
use crate::wire::Tick;

/// What became of one dispatched tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Posted to a worker and linked into the ordering chain.
    Accepted,
    /// The rotation's worker was mid-frame; the tick was discarded.
    DroppedBusy,
    /// The tick's animation clock did not advance past the last
    /// accepted frame.
    RejectedStale,
}

// ── FrameScheduler ───────────────────────────────────────────────

/// Round-robin dispatcher over a worker pool.
pub struct FrameScheduler {
    workers: Vec<FrameWorker>,
    next_worker: usize,
    last_frame_time_ms: f64,
    /// Transmitted gate of the most recently accepted frame.
    last_transmitted: StageGate,
}

impl FrameScheduler {
    pub fn new(workers: Vec<FrameWorker>) -> Self {
        Self {
            workers,
            next_worker: 0,
            last_frame_time_ms: f64::NEG_INFINITY,
            // The first accepted frame transmits unconditionally.
            last_transmitted: StageGate::open(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Admit or discard one tick.
    ///
    /// Retired workers are skipped; a live but busy worker at the
    /// rotation pointer drops the tick without advancing the rotation,
    /// so the same worker is offered the next tick. Dropped and stale
    /// ticks never enter the ordering chain.
    pub fn dispatch(&mut self, tick: Tick) -> Result<DispatchOutcome, StreamError> {
        if tick.frame_time <= self.last_frame_time_ms {
            debug!(
                frame = tick.frame_id,
                frame_time = tick.frame_time,
                "stale tick rejected"
            );
            return Ok(DispatchOutcome::RejectedStale);
        }

        let count = self.workers.len();
        let mut offset = 0;
        while offset < count {
            let index = (self.next_worker + offset) % count;
            let worker = &self.workers[index];

            if !worker.is_alive() {
                offset += 1;
                continue;
            }
            if !worker.is_idle() {
                debug!(frame = tick.frame_id, worker = worker.id(), "busy, tick dropped");
                return Ok(DispatchOutcome::DroppedBusy);
            }

            let (request, transmitted) = FrameRequest::chain(tick, self.last_transmitted.clone());
            match worker.post(request) {
                Ok(()) => {
                    self.last_transmitted = transmitted;
                    self.last_frame_time_ms = tick.frame_time;
                    self.next_worker = (index + 1) % count;
                    return Ok(DispatchOutcome::Accepted);
                }
                // Retired between the liveness check and the post; the
                // dropped request resolved its own gates.
                Err(_) => offset += 1,
            }
        }

        Err(StreamError::WorkersExhausted)
    }
}

// ── Tests ────────────────────────────────────────────────────────
