//! The per-frame worker task.
//!
//! A [`FrameWorker`] owns a one-slot mailbox and carries each posted
//! [`FrameRequest`] through render → compress → transmit. Render and
//! compression overlap freely across workers; transmission is held on
//! the request's predecessor gate so segments of different frames never
//! interleave on the wire.
//!
//! A frame that faults is logged and dropped — its stage cells fail on
//! drop, which releases any successor waiting on them — and the worker
//! stays alive for the next frame. Only cancellation or a closed
//! mailbox retires the worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StreamError;
use crate::jpeg::TileCodec;
use crate::net::FrameSink;
use crate::pipeline::compressor::SegmentCompressor;
use crate::pipeline::request::FrameRequest;
use crate::pipeline::signal::StageState;
use crate::render::Renderer;
use crate::spec::FrameSpec;
use crate::stats::FrameStats;

// ── FrameWorker ──────────────────────────────────────────────────

/// Handle to one spawned worker task.
pub struct FrameWorker {
    id: usize,
    tx: mpsc::Sender<FrameRequest>,
    in_flight: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

/// Collaborators shared by every worker of a session.
#[derive(Clone)]
pub struct WorkerShared {
    pub renderer: Arc<dyn Renderer>,
    pub codec: Arc<dyn TileCodec>,
    pub stats: Arc<FrameStats>,
    pub sink: Arc<dyn FrameSink>,
    pub quality: u8,
}

impl FrameWorker {
    /// Spawn a worker task and return its handle.
    pub fn spawn(id: usize, spec: &FrameSpec, shared: WorkerShared, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let compressor = SegmentCompressor::with_quality(
            spec,
            Arc::clone(&shared.codec),
            Arc::clone(&shared.stats),
            shared.quality,
        );

        tokio::spawn(run(
            id,
            rx,
            Arc::clone(&in_flight),
            Arc::clone(&alive),
            shared,
            compressor,
            cancel,
        ));

        Self {
            id,
            tx,
            in_flight,
            alive,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the worker has no frame in flight.
    pub fn is_idle(&self) -> bool {
        !self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the worker task is still running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Hand a request to the worker. The caller must have checked
    /// [`is_idle`](Self::is_idle) first; the slot is single-depth.
    pub fn post(&self, request: FrameRequest) -> Result<(), StreamError> {
        let was_busy = self.in_flight.swap(true, Ordering::AcqRel);
        debug_assert!(!was_busy, "posted to a busy worker");

        if self.tx.try_send(request).is_err() {
            // Worker retired; the dropped request fails its stages.
            self.in_flight.store(false, Ordering::Release);
            return Err(StreamError::ChannelClosed);
        }
        Ok(())
    }
}

// ── Worker loop ──────────────────────────────────────────────────

async fn run(
    id: usize,
    mut rx: mpsc::Receiver<FrameRequest>,
    in_flight: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    shared: WorkerShared,
    compressor: SegmentCompressor,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let frame_id = request.frame_id;
        if let Err(e) = process(request, &shared, &compressor, &cancel).await {
            // Dropping the request failed its remaining stages already.
            debug!(worker = id, frame = frame_id, error = %e, "frame dropped");
        }
        in_flight.store(false, Ordering::Release);
    }

    alive.store(false, Ordering::Release);
    in_flight.store(false, Ordering::Release);
    debug!(worker = id, "frame worker stopped");
}

/// Carry one request through all three stages.
async fn process(
    request: FrameRequest,
    shared: &WorkerShared,
    compressor: &SegmentCompressor,
    cancel: &CancellationToken,
) -> Result<(), StreamError> {
    let frame_started = Instant::now();

    // Render on the blocking pool.
    let render_started = Instant::now();
    let renderer = Arc::clone(&shared.renderer);
    let (frame_time_ms, circle_time_ms) = (request.frame_time_ms, request.circle_time_ms);
    let frame =
        tokio::task::spawn_blocking(move || renderer.render(frame_time_ms, circle_time_ms))
            .await??;
    shared.stats.add_render_duration(render_started.elapsed());
    request.rendered.complete();

    // The header snapshot is taken at admission order, between render
    // and compress, so every segment of the frame carries it.
    let header = shared.stats.update(request.frame_id, request.frame_time_ms);

    let segments = compressor.compress_frame(Arc::new(frame), header).await?;
    request.compressed.complete();

    // Hold transmission until the previously admitted frame is fully
    // on the wire. A failed predecessor releases us the same way a
    // completed one does; waiting longer would stall the stream.
    let mut predecessor = request.predecessor.clone();
    let state = tokio::select! {
        _ = cancel.cancelled() => return Err(StreamError::Cancelled),
        state = predecessor.wait() => state,
    };
    if state == StageState::Failed {
        debug!(frame = request.frame_id, "predecessor failed, transmitting anyway");
    }

    // Sends are raced against the token too: a stalled peer must not
    // pin a cancelled worker inside the transmit loop.
    let transmit_started = Instant::now();
    for segment in segments {
        tokio::select! {
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            sent = shared.sink.send_binary(segment) => {
                sent.map_err(|e| StreamError::Transmit(e.to_string()))?;
            }
        }
    }
    shared.stats.add_transmit_duration(transmit_started.elapsed());
    request.transmitted.complete();

    shared.stats.add_frame_duration(frame_started.elapsed());
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
