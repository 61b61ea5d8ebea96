//! Region-of-interest extraction.
//!
//! Operators describe the ROI as fractions of the frame (position and size
//! in `[0,1]`), dragged live from the UI. Each frame, the fractions are
//! resolved against the actual frame dimensions into an inclusive pixel
//! rectangle and the covered pixels are copied out row-major.
//!
//! Out-of-range fractions are clamped, never rejected: a half-dragged slider
//! is operator input, not a programming error. The degenerate limit is a
//! 1x1 region, never an empty buffer.

use crate::frame::Frame;

/// Normalized ROI rectangle: x/y position and width/height as frame fractions.
/// Build through `clamped` (or `full`) so the components stay in `[0,1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoiFraction {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl RoiFraction {
    /// Build a fraction rectangle, clamping every component into `[0,1]`.
    /// NaN clamps to 0.
    pub fn clamped(x: f64, y: f64, w: f64, h: f64) -> Self {
        fn unit(v: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, 1.0)
            }
        }
        Self {
            x: unit(x),
            y: unit(y),
            w: unit(w),
            h: unit(h),
        }
    }

    /// The whole frame.
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }
}

impl Default for RoiFraction {
    fn default() -> Self {
        Self::full()
    }
}

/// Inclusive pixel bounds of a resolved ROI. Always within the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoiRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl RoiRect {
    /// Resolve a fraction rectangle against frame dimensions.
    ///
    /// `x1 = floor((width-1) * X)`, `x2 = min(width-1, x1 + floor(width * W))`,
    /// and likewise for rows. With clamped fractions this always yields
    /// `0 <= x1 <= x2 < width` and `0 <= y1 <= y2 < height`.
    pub fn resolve(width: u32, height: u32, fraction: &RoiFraction) -> Self {
        // Frames guarantee non-zero dimensions; guard anyway so a degenerate
        // caller gets a 1x1 rect instead of an underflow.
        let (width, height) = (width.max(1), height.max(1));
        let f = RoiFraction::clamped(fraction.x, fraction.y, fraction.w, fraction.h);
        let x1 = ((width - 1) as f64 * f.x).floor() as u32;
        let y1 = ((height - 1) as f64 * f.y).floor() as u32;
        let x2 = (x1 + (width as f64 * f.w).floor() as u32).min(width - 1);
        let y2 = (y1 + (height as f64 * f.h).floor() as u32).min(height - 1);
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }
}

/// A cropped ROI: resolved bounds plus the copied pixels, row-major.
#[derive(Clone, Debug)]
pub struct RoiRegion {
    pub rect: RoiRect,
    pub pixels: Vec<u8>,
}

impl RoiRegion {
    /// Build a region directly from a pixel buffer (tests and replay).
    pub fn from_pixels(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            rect: RoiRect {
                x1: 0,
                y1: 0,
                x2: width.saturating_sub(1),
                y2: height.saturating_sub(1),
            },
            pixels,
        }
    }
}

/// Crop the fraction rectangle out of a frame.
pub fn extract(frame: &Frame, fraction: &RoiFraction) -> RoiRegion {
    let rect = RoiRect::resolve(frame.width, frame.height, fraction);
    let (rw, rh) = (rect.width() as usize, rect.height() as usize);
    let stride = frame.width as usize;
    let src = frame.pixels();

    let mut pixels = Vec::with_capacity(rw * rh);
    for row in rect.y1..=rect.y2 {
        let start = row as usize * stride + rect.x1 as usize;
        pixels.extend_from_slice(&src[start..start + rw]);
    }
    RoiRegion { rect, pixels }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
