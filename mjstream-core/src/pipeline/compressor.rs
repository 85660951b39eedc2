//! Parallel tile compression.
//!
//! [`SegmentCompressor`] splits a rendered frame into the fixed 2×2
//! grid and compresses every tile concurrently on the blocking pool,
//! so a frame's compression wall time approximates its slowest tile.
//! Each tile owns a reusable, grow-only output buffer; the 80-byte
//! [`SegmentHeader`] is written into that same buffer directly in front
//! of the JPEG payload, so header and payload leave as one contiguous
//! message.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use futures::future::try_join_all;

use crate::error::StreamError;
use crate::jpeg::TileCodec;
use crate::render::{RasterFrame, RasterView};
use crate::spec::{FrameSpec, TileRect};
use crate::stats::FrameStats;
use crate::wire::SegmentHeader;

/// Default JPEG quality, matching the reference pipeline.
pub const DEFAULT_QUALITY: u8 = 90;

// ── SegmentCompressor ────────────────────────────────────────────

/// Per-tile reusable buffers. Capacity only ever grows.
#[derive(Debug, Default)]
struct TileBuffer {
    /// Finished wire message: header, then JPEG bytes.
    out: Vec<u8>,
    /// Row-repack area for strided views.
    scratch: Vec<u8>,
}

/// Tiles a frame and compresses the tiles in parallel.
///
/// Tile buffers are locked individually; the codec's shared core has
/// its own lock inside the [`TileCodec`] implementation.
pub struct SegmentCompressor {
    codec: Arc<dyn TileCodec>,
    stats: Arc<FrameStats>,
    rects: Vec<TileRect>,
    buffers: Vec<Arc<Mutex<TileBuffer>>>,
    quality: u8,
}

impl SegmentCompressor {
    pub fn new(spec: &FrameSpec, codec: Arc<dyn TileCodec>, stats: Arc<FrameStats>) -> Self {
        Self::with_quality(spec, codec, stats, DEFAULT_QUALITY)
    }

    pub fn with_quality(
        spec: &FrameSpec,
        codec: Arc<dyn TileCodec>,
        stats: Arc<FrameStats>,
        quality: u8,
    ) -> Self {
        let rects = spec.tile_rects();
        let buffers = rects
            .iter()
            .map(|_| Arc::new(Mutex::new(TileBuffer::default())))
            .collect();
        Self {
            codec,
            stats,
            rects,
            buffers,
            quality,
        }
    }

    /// Number of tiles per frame.
    pub fn segment_count(&self) -> usize {
        self.rects.len()
    }

    /// Compress every tile of `frame` concurrently.
    ///
    /// Returns one `[header][payload]` message per tile. A codec error
    /// on any tile fails the whole frame — no partial tile set is ever
    /// returned.
    pub async fn compress_frame(
        &self,
        frame: Arc<RasterFrame>,
        header: SegmentHeader,
    ) -> Result<Vec<Bytes>, StreamError> {
        let tasks = self
            .rects
            .iter()
            .zip(&self.buffers)
            .map(|(&rect, buffer)| {
                let codec = Arc::clone(&self.codec);
                let stats = Arc::clone(&self.stats);
                let frame = Arc::clone(&frame);
                let buffer = Arc::clone(buffer);
                let quality = self.quality;

                tokio::task::spawn_blocking(move || {
                    compress_tile(&*codec, &stats, &frame, rect, header, quality, &buffer)
                })
            })
            .collect::<Vec<_>>();

        let results = try_join_all(tasks).await?;
        results.into_iter().collect()
    }
}

/// Compress one tile into its reusable buffer and return the finished
/// wire message.
fn compress_tile(
    codec: &dyn TileCodec,
    stats: &FrameStats,
    frame: &RasterFrame,
    rect: TileRect,
    mut header: SegmentHeader,
    quality: u8,
    buffer: &Mutex<TileBuffer>,
) -> Result<Bytes, StreamError> {
    let started = Instant::now();

    let mut slot = buffer.lock().expect("tile buffer lock poisoned");
    let TileBuffer { out, scratch } = &mut *slot;
    out.clear();
    out.resize(SegmentHeader::SIZE, 0);

    // Tile views are strided through the parent frame; repack the rows
    // into the reusable scratch so the codec sees contiguous pixels.
    let view = frame.view(rect);
    let row_len = rect.width as usize * view.format.bytes_per_pixel();
    let view = if view.stride as usize == row_len {
        view
    } else {
        scratch.clear();
        for y in 0..view.height {
            scratch.extend_from_slice(view.row(y));
        }
        RasterView {
            data: scratch,
            width: view.width,
            height: view.height,
            stride: row_len as u32,
            format: view.format,
        }
    };

    codec.encode(&view, quality, out)?;

    header.segment_x = f64::from(rect.x);
    header.segment_y = f64::from(rect.y);
    header.encode_into(&mut out[..SegmentHeader::SIZE]);

    let message = Bytes::copy_from_slice(out);
    stats.add_compressed_size(message.len());
    stats.add_compress_duration(started.elapsed());
    Ok(message)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::JpegCodec;
    use crate::render::{ClockRenderer, Renderer};
    use crate::spec::SEGMENTS_PER_FRAME;

    fn compressor() -> (SegmentCompressor, FrameSpec) {
        let spec = FrameSpec::new(128, 96, 1);
        let codec: Arc<dyn TileCodec> = Arc::new(JpegCodec::new());
        let stats = Arc::new(FrameStats::new());
        (SegmentCompressor::new(&spec, codec, stats), spec)
    }

    #[tokio::test]
    async fn produces_one_message_per_tile() {
        let (compressor, spec) = compressor();
        let frame = Arc::new(ClockRenderer::new(spec).render(0.0, 0.0).unwrap());

        let header = SegmentHeader {
            frame_id: 3.0,
            frame_time: 48.0,
            ..Default::default()
        };
        let messages = compressor.compress_frame(frame, header).await.unwrap();
        assert_eq!(messages.len(), SEGMENTS_PER_FRAME);

        for message in &messages {
            assert!(message.len() > SegmentHeader::SIZE);
            let decoded = SegmentHeader::decode(message).unwrap();
            assert_eq!(decoded.frame_index(), 3);
        }
    }

    #[tokio::test]
    async fn segments_carry_their_own_coordinates() {
        let (compressor, spec) = compressor();
        let frame = Arc::new(ClockRenderer::new(spec).render(0.0, 0.0).unwrap());

        let messages = compressor
            .compress_frame(frame, SegmentHeader::default())
            .await
            .unwrap();

        let mut coords: Vec<(u32, u32)> = messages
            .iter()
            .map(|m| {
                let h = SegmentHeader::decode(m).unwrap();
                (h.segment_x as u32, h.segment_y as u32)
            })
            .collect();
        coords.sort_unstable();
        assert_eq!(coords, vec![(0, 0), (0, 48), (64, 0), (64, 48)]);
    }

    #[tokio::test]
    async fn payload_decodes_back_to_tile_bitmap() {
        let (compressor, spec) = compressor();
        let frame = Arc::new(ClockRenderer::new(spec).render(0.0, 0.0).unwrap());
        let codec = JpegCodec::new();

        let messages = compressor
            .compress_frame(frame, SegmentHeader::default())
            .await
            .unwrap();
        let tile = codec
            .decode(&messages[0][SegmentHeader::SIZE..])
            .unwrap();
        assert_eq!(tile.width(), spec.tile_width());
        assert_eq!(tile.height(), spec.tile_height());
    }

    #[tokio::test]
    async fn failing_codec_fails_the_frame() {
        struct BrokenCodec;
        impl TileCodec for BrokenCodec {
            fn encode(
                &self,
                _view: &crate::render::RasterView<'_>,
                _quality: u8,
                _out: &mut Vec<u8>,
            ) -> Result<usize, StreamError> {
                Err(StreamError::Codec("broken".into()))
            }
            fn decode(&self, _bytes: &[u8]) -> Result<image::RgbImage, StreamError> {
                Err(StreamError::Codec("broken".into()))
            }
        }

        let spec = FrameSpec::new(64, 64, 1);
        let stats = Arc::new(FrameStats::new());
        let compressor = SegmentCompressor::new(&spec, Arc::new(BrokenCodec), stats);
        let frame = Arc::new(RasterFrame::blank(64, 64));

        let result = compressor
            .compress_frame(frame, SegmentHeader::default())
            .await;
        assert!(matches!(result, Err(StreamError::Codec(_))));
    }
}
