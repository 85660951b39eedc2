//! JPEG tile codec seam.
//!
//! The pipeline compresses and decompresses tiles through the
//! [`TileCodec`] trait; [`JpegCodec`] is the production implementation.
//! Shared codec state lives behind a single mutex that is distinct from
//! any per-tile buffer lock, and the codec handle is plain owned data —
//! dropped deterministically with the pipeline.

use std::borrow::Cow;
use std::sync::Mutex;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, RgbImage};

use crate::error::StreamError;
use crate::render::{PixelFormat, RasterView};

// ── TileCodec ────────────────────────────────────────────────────

/// Encode/decode collaborator for compressed tiles.
pub trait TileCodec: Send + Sync {
    /// Compress `view` at `quality` (1..=100), appending the encoded
    /// bytes to `out`. Returns the number of bytes appended.
    fn encode(
        &self,
        view: &RasterView<'_>,
        quality: u8,
        out: &mut Vec<u8>,
    ) -> Result<usize, StreamError>;

    /// Decompress one tile back into an RGB bitmap.
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, StreamError>;
}

// ── JpegCodec ────────────────────────────────────────────────────

/// Codec-wide counters, mutated under the core lock.
#[derive(Debug, Default)]
struct JpegCore {
    tiles_encoded: u64,
    bytes_out: u64,
}

/// JPEG implementation of [`TileCodec`].
///
/// Compression itself runs outside the core lock; only the shared
/// counters are serialized. Views that are already tightly packed
/// (stride == row length) are encoded without copying; strided tile
/// views get a row repack first.
#[derive(Debug, Default)]
pub struct JpegCodec {
    core: Mutex<JpegCore>,
}

impl JpegCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles encoded since construction.
    pub fn tiles_encoded(&self) -> u64 {
        self.core.lock().expect("codec core lock poisoned").tiles_encoded
    }

    /// Compressed bytes produced since construction.
    pub fn bytes_out(&self) -> u64 {
        self.core.lock().expect("codec core lock poisoned").bytes_out
    }
}

impl TileCodec for JpegCodec {
    fn encode(
        &self,
        view: &RasterView<'_>,
        quality: u8,
        out: &mut Vec<u8>,
    ) -> Result<usize, StreamError> {
        if view.format != PixelFormat::Rgb8 {
            return Err(StreamError::Codec(format!(
                "unsupported pixel format {:?}",
                view.format
            )));
        }

        // The encoder needs contiguous rows; repack only when strided.
        let bpp = view.format.bytes_per_pixel();
        let row_len = view.width as usize * bpp;
        let packed: Cow<'_, [u8]> = if view.stride as usize == row_len {
            Cow::Borrowed(&view.data[..row_len * view.height as usize])
        } else {
            let mut buf = Vec::with_capacity(row_len * view.height as usize);
            for y in 0..view.height {
                buf.extend_from_slice(view.row(y));
            }
            Cow::Owned(buf)
        };

        let before = out.len();
        JpegEncoder::new_with_quality(&mut *out, quality)
            .encode(&packed, view.width, view.height, ExtendedColorType::Rgb8)
            .map_err(|e| StreamError::Codec(format!("jpeg encode failed: {e}")))?;
        let written = out.len() - before;

        let mut core = self.core.lock().expect("codec core lock poisoned");
        core.tiles_encoded += 1;
        core.bytes_out += written as u64;

        Ok(written)
    }

    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, StreamError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map_err(|e| StreamError::Codec(format!("jpeg decode failed: {e}")))?;
        Ok(image.into_rgb8())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RasterFrame;
    use crate::spec::TileRect;

    fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> RasterFrame {
        let mut frame = RasterFrame::blank(w, h);
        for chunk in frame.data.chunks_exact_mut(3) {
            chunk.copy_from_slice(&rgb);
        }
        frame
    }

    #[test]
    fn encode_decode_preserves_dimensions() {
        let frame = solid_frame(64, 48, [200, 30, 30]);
        let codec = JpegCodec::new();

        let mut out = Vec::new();
        let written = codec
            .encode(
                &frame.view(TileRect { x: 0, y: 0, width: 64, height: 48 }),
                90,
                &mut out,
            )
            .unwrap();
        assert_eq!(written, out.len());
        assert!(written > 0);

        let decoded = codec.decode(&out).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);

        // Lossy, but a solid color should survive roughly intact.
        let px = decoded.get_pixel(10, 10);
        assert!(px[0] > 150 && px[1] < 90 && px[2] < 90);
    }

    #[test]
    fn encode_appends_after_existing_bytes() {
        let frame = solid_frame(32, 32, [0, 0, 255]);
        let codec = JpegCodec::new();

        let mut out = vec![0u8; 80]; // header placeholder
        codec
            .encode(
                &frame.view(TileRect { x: 0, y: 0, width: 32, height: 32 }),
                80,
                &mut out,
            )
            .unwrap();
        assert!(out.len() > 80);
        assert_eq!(&out[..80], &[0u8; 80][..]);
        // JPEG SOI marker lands right after the placeholder.
        assert_eq!(&out[80..82], &[0xFF, 0xD8]);
    }

    #[test]
    fn strided_tile_view_encodes_only_its_region() {
        // Left half red, right half green; encode only the right tile.
        let mut frame = solid_frame(64, 32, [255, 0, 0]);
        for y in 0..32usize {
            for x in 32..64usize {
                let off = y * frame.stride as usize + x * 3;
                frame.data[off..off + 3].copy_from_slice(&[0, 255, 0]);
            }
        }

        let codec = JpegCodec::new();
        let mut out = Vec::new();
        codec
            .encode(
                &frame.view(TileRect { x: 32, y: 0, width: 32, height: 32 }),
                90,
                &mut out,
            )
            .unwrap();

        let decoded = codec.decode(&out).unwrap();
        let px = decoded.get_pixel(16, 16);
        assert!(px[1] > 150 && px[0] < 90, "expected green tile, got {px:?}");
    }

    #[test]
    fn decode_garbage_is_codec_failure() {
        let codec = JpegCodec::new();
        assert!(matches!(
            codec.decode(&[0u8; 16]),
            Err(StreamError::Codec(_))
        ));
    }

    #[test]
    fn core_counters_track_encodes() {
        let frame = solid_frame(16, 16, [1, 2, 3]);
        let codec = JpegCodec::new();
        let mut out = Vec::new();
        codec
            .encode(
                &frame.view(TileRect { x: 0, y: 0, width: 16, height: 16 }),
                90,
                &mut out,
            )
            .unwrap();
        assert_eq!(codec.tiles_encoded(), 1);
        assert_eq!(codec.bytes_out(), out.len() as u64);
    }
}
