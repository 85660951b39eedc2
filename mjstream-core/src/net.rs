//! TCP message channel with reader/writer tasks and a buffered-bytes
//! gauge.
//!
//! [`StreamConnection`] wraps a `TcpStream` in the [`StreamCodec`] and
//! splits it into background tasks, mirroring how a browser WebSocket
//! behaves: `send` never blocks on the network, `recv` yields whole
//! messages, and `buffered_amount()` reports bytes accepted for sending
//! but not yet flushed to the socket. The gauge is what the receiver's
//! backpressure policy keys off.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::StreamError;
use crate::wire::{ControlMessage, StreamCodec, WireFrame};

// ── FrameSink ────────────────────────────────────────────────────

/// Outbound half of a message channel.
///
/// The pipeline only ever talks to this trait, so tests can substitute
/// an in-memory sink for the real socket.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Queue one binary message.
    async fn send_binary(&self, payload: Bytes) -> Result<(), StreamError>;

    /// Queue one text message.
    async fn send_text(&self, text: String) -> Result<(), StreamError>;

    /// Bytes queued but not yet flushed to the underlying socket.
    fn buffered_amount(&self) -> u64;
}

// ── StreamConnection ─────────────────────────────────────────────

/// A connection to a single peer.
pub struct StreamConnection {
    sender: StreamSender,
    rx: mpsc::Receiver<WireFrame>,
}

/// Cloneable outbound handle for a [`StreamConnection`].
#[derive(Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<WireFrame>,
    buffered: Arc<AtomicU64>,
}

impl StreamConnection {
    /// Wrap an established TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let (mut net_writer, mut net_reader) = Framed::new(stream, StreamCodec).split();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<WireFrame>(64);
        // Network -> User
        let (network_tx, user_rx) = mpsc::channel::<WireFrame>(64);

        let buffered = Arc::new(AtomicU64::new(0));

        // Writer task: drains the outbound queue and settles the gauge
        // only after each frame has actually been flushed.
        let writer_gauge = Arc::clone(&buffered);
        tokio::spawn(async move {
            while let Some(frame) = network_rx.recv().await {
                let len = frame.payload_len() as u64;
                let result = net_writer.send(frame).await;
                writer_gauge.fetch_sub(len, Ordering::AcqRel);
                if let Err(e) = result {
                    debug!("stream write error: {e}");
                    break;
                }
            }
            // All sender handles gone: flush and send FIN so the peer
            // observes the close instead of waiting on a silent socket.
            let _ = net_writer.close().await;
        });

        // Reader task: forwards inbound frames until EOF or codec error.
        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(frame) => {
                        if network_tx.send(frame).await.is_err() {
                            break; // receiver dropped
                        }
                    }
                    Err(e) => {
                        debug!("stream read error: {e}");
                        break;
                    }
                }
            }
        });

        Self {
            sender: StreamSender {
                tx: user_tx,
                buffered,
            },
            rx: user_rx,
        }
    }

    /// Connect to a remote peer.
    pub async fn connect(addr: &str) -> Result<Self, StreamError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    /// Receive the next message. `None` means the peer closed the
    /// connection or the stream failed.
    pub async fn recv(&mut self) -> Option<WireFrame> {
        self.rx.recv().await
    }

    /// A cloneable outbound handle.
    pub fn sender(&self) -> StreamSender {
        self.sender.clone()
    }
}

impl StreamSender {
    async fn send(&self, frame: WireFrame) -> Result<(), StreamError> {
        // Count the bytes before handing off; the writer task settles
        // the gauge after the flush.
        self.buffered
            .fetch_add(frame.payload_len() as u64, Ordering::AcqRel);
        if let Err(e) = self.tx.send(frame).await {
            self.buffered
                .fetch_sub(e.0.payload_len() as u64, Ordering::AcqRel);
            return Err(StreamError::ChannelClosed);
        }
        Ok(())
    }

    /// Serialize and queue a control message.
    pub async fn send_control(&self, message: &ControlMessage) -> Result<(), StreamError> {
        self.send_text(message.to_json()?).await
    }
}

#[async_trait]
impl FrameSink for StreamSender {
    async fn send_binary(&self, payload: Bytes) -> Result<(), StreamError> {
        self.send(WireFrame::Binary(payload)).await
    }

    async fn send_text(&self, text: String) -> Result<(), StreamError> {
        self.send(WireFrame::Text(text)).await
    }

    fn buffered_amount(&self) -> u64 {
        self.buffered.load(Ordering::Acquire)
    }
}

// ── Tests ────────────────────────────────────────────────────────
