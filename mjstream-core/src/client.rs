//! Headless viewer: connects, decodes, reassembles, publishes.
//!
//! [`ViewClient`] mirrors what a browser viewer does: it waits for the
//! server's `READY`, decodes arriving tile segments concurrently on the
//! blocking pool, reorders them through the [`JitterBuffer`], and
//! publishes every completed frame (and the stats header riding on it)
//! through `watch` channels. Consumers observe the *latest* frame only;
//! intermediate frames they were too slow for are skipped, never
//! queued.
//!
//! Ticks are refused while the transport reports more than
//! [`BUSY_THRESHOLD`] unflushed bytes — the send side of the drop-based
//! backpressure loop.

use std::sync::Arc;

use image::RgbImage;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::jitter::{DecodedSegment, JitterBuffer, JitterEvent};
use crate::jpeg::{JpegCodec, TileCodec};
use crate::net::{FrameSink, StreamConnection, StreamSender};
use crate::spec::FrameSpec;
use crate::wire::{ControlMessage, SegmentHeader, Tick, WireFrame};

/// Unflushed-byte level above which ticks are refused.
pub const BUSY_THRESHOLD: u64 = 1000;

/// How long to wait for the server's `READY`.
const HANDSHAKE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// One fully reassembled frame.
#[derive(Debug, Clone)]
pub struct AssembledFrame {
    /// Stats header shared by the frame's segments.
    pub header: SegmentHeader,
    pub image: RgbImage,
}

impl AssembledFrame {
    pub fn frame_id(&self) -> u64 {
        self.header.frame_index()
    }
}

// ── ViewClient ───────────────────────────────────────────────────

/// Client endpoint of one streaming session.
pub struct ViewClient {
    spec: FrameSpec,
    sender: StreamSender,
    frames: watch::Receiver<Option<AssembledFrame>>,
    stats: watch::Receiver<SegmentHeader>,
    cancel: CancellationToken,
}

impl ViewClient {
    /// Connect and complete the `READY` handshake.
    pub async fn connect(addr: &str) -> Result<Self, StreamError> {
        let mut connection = StreamConnection::connect(addr).await?;

        let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, connection.recv())
            .await
            .map_err(|_| StreamError::Timeout(HANDSHAKE_TIMEOUT))?;
        let spec = match first {
            Some(WireFrame::Text(text)) => match ControlMessage::from_json(&text)? {
                ControlMessage::Ready(spec) => spec,
                _ => return Err(StreamError::ProtocolViolation("expected READY first")),
            },
            Some(WireFrame::Binary(_)) => {
                return Err(StreamError::ProtocolViolation("binary before READY"));
            }
            None => return Err(StreamError::ChannelClosed),
        };

        let sender = connection.sender();
        let (frames_tx, frames) = watch::channel(None);
        let (stats_tx, stats) = watch::channel(SegmentHeader::default());
        let cancel = CancellationToken::new();

        tokio::spawn(receive_loop(
            connection,
            spec,
            Arc::new(JpegCodec::new()) as Arc<dyn TileCodec>,
            frames_tx,
            stats_tx,
            cancel.clone(),
        ));

        Ok(Self {
            spec,
            sender,
            frames,
            stats,
            cancel,
        })
    }

    /// Geometry announced by the server.
    pub fn spec(&self) -> FrameSpec {
        self.spec
    }

    /// Request a frame, unless the transport is backed up.
    ///
    /// Refusal is the intended behavior under congestion: the caller
    /// skips this tick and tries again on its next clock edge.
    pub async fn send_tick(&self, tick: Tick) -> Result<(), StreamError> {
        let buffered = self.sender.buffered_amount();
        if buffered > BUSY_THRESHOLD {
            return Err(StreamError::ServerBusy { buffered });
        }
        self.sender.send_control(&ControlMessage::Tick(tick)).await
    }

    /// Watch the latest completed frame.
    pub fn frames(&self) -> watch::Receiver<Option<AssembledFrame>> {
        self.frames.clone()
    }

    /// Watch the most recent stats header.
    pub fn stats(&self) -> watch::Receiver<SegmentHeader> {
        self.stats.clone()
    }

    /// Stop the receive loop.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ViewClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Receive loop ─────────────────────────────────────────────────

async fn receive_loop(
    mut connection: StreamConnection,
    spec: FrameSpec,
    codec: Arc<dyn TileCodec>,
    frames_tx: watch::Sender<Option<AssembledFrame>>,
    stats_tx: watch::Sender<SegmentHeader>,
    cancel: CancellationToken,
) {
    let mut jitter = JitterBuffer::new();
    let (decoded_tx, mut decoded_rx) =
        mpsc::channel::<(u64, Result<DecodedSegment, StreamError>)>(64);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = connection.recv() => match frame {
                Some(WireFrame::Binary(payload)) => {
                    let header = match SegmentHeader::decode(&payload) {
                        Ok(header) => header,
                        Err(e) => {
                            warn!(error = %e, "undecodable segment header, closing");
                            break;
                        }
                    };
                    spawn_decode(Arc::clone(&codec), header, payload, decoded_tx.clone());
                }
                Some(WireFrame::Text(text)) => {
                    // The server's control channel is one READY and done.
                    warn!(message = %text, "unexpected control message");
                }
                None => {
                    debug!("server closed the connection");
                    break;
                }
            },

            decoded = decoded_rx.recv() => {
                // Our own sender half keeps the channel open.
                let Some((frame_id, result)) = decoded else { break };
                match jitter.on_segment(frame_id, result) {
                    Some(JitterEvent::Completed { frame_id, segments }) => {
                        let frame = assemble(spec, segments);
                        jitter.mark_displayed(frame_id);
                        stats_tx.send_replace(frame.header);
                        frames_tx.send_replace(Some(frame));
                    }
                    Some(JitterEvent::Failed { frame_id }) => {
                        warn!(frame = frame_id, "frame lost to a decode failure");
                    }
                    Some(JitterEvent::Superseded { frame_id }) => {
                        debug!(frame = frame_id, "stale frame discarded");
                    }
                    None => {}
                }
            },
        }
    }
}

/// Decode one tile off the async path.
fn spawn_decode(
    codec: Arc<dyn TileCodec>,
    header: SegmentHeader,
    payload: bytes::Bytes,
    decoded_tx: mpsc::Sender<(u64, Result<DecodedSegment, StreamError>)>,
) {
    tokio::spawn(async move {
        let frame_id = header.frame_index();
        let result = tokio::task::spawn_blocking(move || -> Result<DecodedSegment, StreamError> {
            let bitmap = codec.decode(&payload[SegmentHeader::SIZE..])?;
            Ok(DecodedSegment { header, bitmap })
        })
        .await
        .map_err(StreamError::from)
        .and_then(|r| r);
        let _ = decoded_tx.send((frame_id, result)).await;
    });
}

/// Paste decoded tiles onto a frame-sized canvas at the positions
/// their headers carry.
fn assemble(spec: FrameSpec, segments: Vec<DecodedSegment>) -> AssembledFrame {
    let header = segments[0].header;
    let mut image = RgbImage::new(spec.width, spec.height);
    for segment in segments {
        image::imageops::replace(
            &mut image,
            &segment.bitmap,
            segment.header.segment_x as i64,
            segment.header.segment_y as i64,
        );
    }
    AssembledFrame { header, image }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) -> DecodedSegment {
        DecodedSegment {
            header: SegmentHeader {
                frame_id: 1.0,
                segment_x: f64::from(x),
                segment_y: f64::from(y),
                ..Default::default()
            },
            bitmap: RgbImage::from_pixel(w, h, image::Rgb(rgb)),
        }
    }

    #[test]
    fn assemble_places_tiles_by_header_coordinates() {
        let spec = FrameSpec::new(8, 8, 1);
        let frame = assemble(
            spec,
            vec![
                tile(0, 0, 4, 4, [255, 0, 0]),
                tile(0, 4, 4, 4, [0, 255, 0]),
                tile(4, 0, 4, 4, [0, 0, 255]),
                tile(4, 4, 4, 4, [255, 255, 0]),
            ],
        );

        assert_eq!(frame.frame_id(), 1);
        assert_eq!(frame.image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(frame.image.get_pixel(0, 7).0, [0, 255, 0]);
        assert_eq!(frame.image.get_pixel(7, 0).0, [0, 0, 255]);
        assert_eq!(frame.image.get_pixel(7, 7).0, [255, 255, 0]);
    }

    #[test]
    fn assemble_keeps_the_stats_header() {
        let spec = FrameSpec::new(4, 4, 1);
        let mut segment = tile(0, 0, 2, 2, [9, 9, 9]);
        segment.header.bandwidth = 6.0;
        segment.header.frame_rate = 60.0;

        let frame = assemble(
            spec,
            vec![
                segment,
                tile(0, 2, 2, 2, [9, 9, 9]),
                tile(2, 0, 2, 2, [9, 9, 9]),
                tile(2, 2, 2, 2, [9, 9, 9]),
            ],
        );
        assert_eq!(frame.header.bandwidth, 6.0);
        assert_eq!(frame.header.frame_rate, 60.0);
    }
}
