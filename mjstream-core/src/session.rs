//! Server-side session orchestration.
//!
//! One [`RenderSession`] serves one connected viewer: it announces the
//! frame geometry with `READY`, then turns every incoming `TICK` into a
//! dispatch against the worker pool. The session owns the pool's
//! cancellation scope, so a closed connection tears the whole pipeline
//! down.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::StreamError;
use crate::jpeg::{JpegCodec, TileCodec};
use crate::net::StreamConnection;
use crate::pipeline::{DispatchOutcome, FrameScheduler, FrameWorker, WorkerShared};
use crate::render::{ClockRenderer, Renderer};
use crate::spec::FrameSpec;
use crate::stats::FrameStats;
use crate::wire::{ControlMessage, WireFrame};

// ── SessionConfig ────────────────────────────────────────────────

/// Per-session tuning.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub spec: FrameSpec,
    /// Size of the worker pool.
    pub worker_count: usize,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spec: FrameSpec::new(1280, 720, 1),
            worker_count: 3,
            quality: 90,
        }
    }
}

// ── RenderSession ────────────────────────────────────────────────

/// Serves frames to a single connected viewer.
pub struct RenderSession {
    config: SessionConfig,
    renderer: Arc<dyn Renderer>,
    codec: Arc<dyn TileCodec>,
}

impl RenderSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            renderer: Arc::new(ClockRenderer::new(config.spec)),
            codec: Arc::new(JpegCodec::new()),
        }
    }

    /// Substitute the frame source (defaults to the clock animation).
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Drive the session until the peer disconnects, a protocol
    /// violation occurs, or `cancel` fires.
    pub async fn serve(
        self,
        mut connection: StreamConnection,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        // Child scope: whatever ends the session retires the pool.
        let pool_cancel = cancel.child_token();
        let result = self.drive(&mut connection, &pool_cancel).await;
        pool_cancel.cancel();
        result
    }

    async fn drive(
        &self,
        connection: &mut StreamConnection,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let sender = connection.sender();
        let stats = Arc::new(FrameStats::new());

        let shared = WorkerShared {
            renderer: Arc::clone(&self.renderer),
            codec: Arc::clone(&self.codec),
            stats,
            sink: Arc::new(sender.clone()),
            quality: self.config.quality,
        };
        let workers: Vec<FrameWorker> = (0..self.config.worker_count)
            .map(|id| FrameWorker::spawn(id, &self.config.spec, shared.clone(), cancel.clone()))
            .collect();
        let mut scheduler = FrameScheduler::new(workers);

        sender
            .send_control(&ControlMessage::Ready(self.config.spec))
            .await?;
        info!(
            width = self.config.spec.width,
            height = self.config.spec.height,
            workers = self.config.worker_count,
            "session ready"
        );

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                frame = connection.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        debug!("peer closed the connection");
                        return Ok(());
                    }
                },
            };

            match frame {
                WireFrame::Text(text) => {
                    self.handle_control(&mut scheduler, &text)?;
                }
                WireFrame::Binary(_) => {
                    return Err(StreamError::ProtocolViolation(
                        "unexpected binary message from viewer",
                    ));
                }
            }
        }
    }

    fn handle_control(
        &self,
        scheduler: &mut FrameScheduler,
        text: &str,
    ) -> Result<(), StreamError> {
        match ControlMessage::from_json(text)? {
            ControlMessage::Tick(tick) => match scheduler.dispatch(tick)? {
                DispatchOutcome::Accepted => {
                    trace!(frame = tick.frame_id, "tick accepted");
                }
                DispatchOutcome::DroppedBusy => {
                    debug!(frame = tick.frame_id, "all hands busy, frame dropped");
                }
                DispatchOutcome::RejectedStale => {
                    warn!(
                        frame = tick.frame_id,
                        frame_time = tick.frame_time,
                        "non-monotonic tick ignored"
                    );
                }
            },
            ControlMessage::Mouse(report) => {
                info!(
                    kind = report.kind,
                    x = report.pos_x,
                    y = report.pos_y,
                    "pointer report"
                );
            }
            ControlMessage::Ready(_) => {
                return Err(StreamError::ProtocolViolation("READY sent by viewer"));
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
