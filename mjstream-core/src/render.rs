//! Frame rendering: raster types, the renderer seam, and the synthetic
//! clock animation.
//!
//! The pipeline treats the renderer as a collaborator behind the
//! [`Renderer`] trait; the clock/ball content exists to exercise the
//! pipeline, nothing more.

use std::path::Path;

use image::RgbImage;
use image::imageops::FilterType;

use crate::error::StreamError;
use crate::spec::{FrameSpec, TileRect};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw rendered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

// ── RasterFrame ──────────────────────────────────────────────────

/// A raw, uncompressed rendered frame.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
#[derive(Debug, Clone)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    /// Row pitch in **bytes**.
    pub stride: u32,
    pub format: PixelFormat,
    /// Raw pixel data — `stride * height` bytes.
    pub data: Vec<u8>,
}

impl RasterFrame {
    /// Wrap a decoded RGB bitmap (tightly packed rows).
    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            stride: width * PixelFormat::Rgb8.bytes_per_pixel() as u32,
            format: PixelFormat::Rgb8,
            data: image.into_raw(),
        }
    }

    /// An all-black RGB frame.
    pub fn blank(width: u32, height: u32) -> Self {
        let stride = width * PixelFormat::Rgb8.bytes_per_pixel() as u32;
        Self {
            width,
            height,
            stride,
            format: PixelFormat::Rgb8,
            data: vec![0u8; (stride * height) as usize],
        }
    }

    /// A strided view of one tile of this frame.
    ///
    /// # Panics
    ///
    /// Panics if `rect` is out of bounds.
    pub fn view(&self, rect: TileRect) -> RasterView<'_> {
        let bpp = self.format.bytes_per_pixel();
        assert!(rect.x + rect.width <= self.width);
        assert!(rect.y + rect.height <= self.height);

        let offset = rect.y as usize * self.stride as usize + rect.x as usize * bpp;
        RasterView {
            data: &self.data[offset..],
            width: rect.width,
            height: rect.height,
            stride: self.stride,
            format: self.format,
        }
    }

    fn put_pixel(&mut self, x: i64, y: i64, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        self.data[offset..offset + 3].copy_from_slice(&rgb);
    }
}

/// A borrowed rectangular window into a [`RasterFrame`].
///
/// `data` starts at the view's top-left pixel; rows are `stride` bytes
/// apart (the *parent* frame's stride).
#[derive(Debug, Clone, Copy)]
pub struct RasterView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
}

impl RasterView<'_> {
    /// The pixel bytes of row `y` (exactly `width * bpp` bytes).
    pub fn row(&self, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride as usize;
        &self.data[start..start + self.width as usize * bpp]
    }
}

/// Load a background image from disk, scaled to the frame geometry.
pub fn load_background(path: &Path, spec: &FrameSpec) -> Result<RasterFrame, StreamError> {
    let image = image::open(path)
        .map_err(|e| StreamError::Codec(format!("background {}: {e}", path.display())))?
        .into_rgb8();
    let image = if image.dimensions() == (spec.width, spec.height) {
        image
    } else {
        image::imageops::resize(&image, spec.width, spec.height, FilterType::Triangle)
    };
    Ok(RasterFrame::from_rgb(image))
}

// ── Renderer ─────────────────────────────────────────────────────

/// Produces a raster for a given animation timestamp.
///
/// Implementations must be cheap to call repeatedly and safe to share
/// across worker tasks; each call allocates a fresh frame so workers
/// can pipeline without aliasing.
pub trait Renderer: Send + Sync {
    /// Render the frame for `frame_time_ms` / `circle_time_ms`
    /// (both in milliseconds of the client's animation clock).
    fn render(&self, frame_time_ms: f64, circle_time_ms: f64) -> Result<RasterFrame, StreamError>;
}

// ── ClockRenderer ────────────────────────────────────────────────

const SKY_BLUE: [u8; 3] = [135, 206, 235];
const HAND_BLACK: [u8; 3] = [0, 0, 0];
const BALL_ORANGE: [u8; 3] = [255, 165, 0];

/// Ball radius in pixels.
const BALL_RADIUS: f64 = 20.0;

/// The synthetic animation: a clock hand revolving at a fixed period
/// plus a bouncing ball, over a flat (or image) background.
pub struct ClockRenderer {
    spec: FrameSpec,
    background: Option<RasterFrame>,
}

impl ClockRenderer {
    pub fn new(spec: FrameSpec) -> Self {
        Self {
            spec,
            background: None,
        }
    }

    /// Composite `background` under the animation instead of the flat
    /// fill. Must match the frame dimensions.
    pub fn with_background(mut self, background: RasterFrame) -> Result<Self, StreamError> {
        if background.width != self.spec.width || background.height != self.spec.height {
            return Err(StreamError::Codec(format!(
                "background is {}x{}, frame is {}x{}",
                background.width, background.height, self.spec.width, self.spec.height
            )));
        }
        self.background = Some(background);
        Ok(self)
    }

    fn draw_hand(&self, frame: &mut RasterFrame, circle_time_ms: f64) {
        let spec = &self.spec;
        let angle_deg =
            (circle_time_ms / 1000.0 * 360.0 / f64::from(spec.spin_duration_sec)) % 360.0;
        let angle = angle_deg.to_radians();
        let (sin, cos) = angle.sin_cos();

        let cx = f64::from(spec.width) * 0.5;
        let cy = f64::from(spec.height) * 0.5;

        // A 10px-thick bar from the inner radius outward, plotted as
        // short perpendicular strokes along its length.
        let half_thickness = 5.0;
        let mut d = f64::from(spec.center);
        let end = f64::from(spec.center + spec.radius);
        while d <= end {
            let px = cx + cos * d;
            let py = cy + sin * d;
            let mut t = -half_thickness;
            while t <= half_thickness {
                let x = (px - sin * t).round() as i64;
                let y = (py + cos * t).round() as i64;
                frame.put_pixel(x, y, HAND_BLACK);
                t += 1.0;
            }
            d += 0.5;
        }
    }

    fn draw_ball(&self, frame: &mut RasterFrame, frame_time_ms: f64) {
        let w = f64::from(self.spec.width);
        let h = f64::from(self.spec.height);

        let bounce = (frame_time_ms / 1000.0).sin().abs();
        let cx = w * 0.5;
        let top = h - (h - 2.0 * BALL_RADIUS) * bounce;
        let cy = top - BALL_RADIUS;

        let r2 = BALL_RADIUS * BALL_RADIUS;
        let x0 = (cx - BALL_RADIUS).floor() as i64;
        let x1 = (cx + BALL_RADIUS).ceil() as i64;
        let y0 = (cy - BALL_RADIUS).floor() as i64;
        let y1 = (cy + BALL_RADIUS).ceil() as i64;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                if dx * dx + dy * dy <= r2 {
                    frame.put_pixel(x, y, BALL_ORANGE);
                }
            }
        }
    }
}

impl Renderer for ClockRenderer {
    fn render(&self, frame_time_ms: f64, circle_time_ms: f64) -> Result<RasterFrame, StreamError> {
        let mut frame = match &self.background {
            Some(bg) => bg.clone(),
            None => {
                let mut f = RasterFrame::blank(self.spec.width, self.spec.height);
                for chunk in f.data.chunks_exact_mut(3) {
                    chunk.copy_from_slice(&SKY_BLUE);
                }
                f
            }
        };

        self.draw_hand(&mut frame, circle_time_ms);
        self.draw_ball(&mut frame, frame_time_ms);

        Ok(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────
