//! Frame geometry shared between server and client.
//!
//! [`FrameSpec`] is sent as the `READY` payload right after connection
//! setup. It defines the raster dimensions, the clock-face geometry the
//! renderer draws, and — implicitly — the 2×2 tile grid every frame is
//! split into for compression and transmission.

use serde::{Deserialize, Serialize};

// ── Tile grid ────────────────────────────────────────────────────

/// Tile columns per frame.
pub const GRID_COLS: u32 = 2;
/// Tile rows per frame.
pub const GRID_ROWS: u32 = 2;
/// Tiles per frame (the jitter buffer's expected segment count).
pub const SEGMENTS_PER_FRAME: usize = (GRID_COLS * GRID_ROWS) as usize;

/// One rectangular sub-region of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

// ── FrameSpec ────────────────────────────────────────────────────

/// Render geometry negotiated once per connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameSpec {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Inner radius of the clock hand, in pixels.
    pub center: u32,
    /// Length of the clock hand, in pixels.
    pub radius: u32,
    /// Seconds per full hand revolution.
    pub spin_duration_sec: u32,
    /// Tick subdivisions drawn on the client's clock face.
    pub spin_subdivisions: u32,
}

impl FrameSpec {
    /// Create a spec for a `width`×`height` frame whose hand revolves
    /// once every `spin_duration_sec` seconds, subdividing each second
    /// into 60 ticks.
    pub fn new(width: u32, height: u32, spin_duration_sec: u32) -> Self {
        Self::with_subdivisions(width, height, spin_duration_sec, 60)
    }

    /// Like [`new`](Self::new) with an explicit per-second subdivision.
    pub fn with_subdivisions(
        width: u32,
        height: u32,
        spin_duration_sec: u32,
        subdivisions_per_sec: u32,
    ) -> Self {
        let radius = height / 3;
        let center = radius / 2;
        Self {
            width,
            height,
            center,
            radius,
            spin_duration_sec,
            spin_subdivisions: spin_duration_sec * subdivisions_per_sec,
        }
    }

    /// Width of one tile. Frame dimensions must divide evenly.
    pub fn tile_width(&self) -> u32 {
        self.width / GRID_COLS
    }

    /// Height of one tile.
    pub fn tile_height(&self) -> u32 {
        self.height / GRID_ROWS
    }

    /// The fixed tile grid, column-major to match the original segment
    /// numbering (`x` varies slowest).
    pub fn tile_rects(&self) -> Vec<TileRect> {
        let (tw, th) = (self.tile_width(), self.tile_height());
        (0..GRID_COLS * GRID_ROWS)
            .map(|index| TileRect {
                x: (index >> 1) * tw,
                y: (index & 1) * th,
                width: tw,
                height: th,
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_geometry() {
        let spec = FrameSpec::new(1280, 720, 1);
        assert_eq!(spec.radius, 240);
        assert_eq!(spec.center, 120);
        assert_eq!(spec.spin_subdivisions, 60);
    }

    #[test]
    fn tile_grid_covers_frame() {
        let spec = FrameSpec::new(1280, 720, 1);
        let rects = spec.tile_rects();
        assert_eq!(rects.len(), SEGMENTS_PER_FRAME);

        let area: u64 = rects
            .iter()
            .map(|r| r.width as u64 * r.height as u64)
            .sum();
        assert_eq!(area, 1280 * 720);

        // Column-major: second rect is the one below the first.
        assert_eq!(rects[0], TileRect { x: 0, y: 0, width: 640, height: 360 });
        assert_eq!(rects[1].y, 360);
        assert_eq!(rects[2].x, 640);
    }

    #[test]
    fn serializes_camel_case() {
        let spec = FrameSpec::new(640, 360, 2);
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("spinDurationSec"));
        assert!(json.contains("spinSubdivisions"));
    }
}
