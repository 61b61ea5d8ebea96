//! Frames and frame sources.
//!
//! A `Frame` is an immutable grayscale image as it came off the sensor.
//! Pixels live behind an `Arc` so the pipeline can publish its latest frame
//! to consumers without copying megapixels per render tick.
//!
//! `FrameSource` is the acquisition boundary: the camera driver lives on the
//! other side of it. The crate ships a `SyntheticSource` that stands in for
//! real hardware in tests, the demo, and headless runs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One grayscale frame. Immutable once acquired.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Create a frame from row-major Mono8 pixel data.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame pixel count {} does not match {}x{}",
                pixels.len(),
                width,
                height
            ));
        }
        Ok(Self {
            pixels: pixels.into(),
            width,
            height,
        })
    }

    /// Row-major pixel data, read-only.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_acquired: u64,
}

/// Abstract frame acquisition.
///
/// `try_acquire` may block up to `timeout`:
/// - `Ok(Some(frame))` - a frame was grabbed
/// - `Ok(None)` - no frame within the timeout (not fatal; skip the cycle)
/// - `Err` - acquisition error (the driver counts these against its budget)
pub trait FrameSource: Send {
    /// Open the device / stream. Called once before the first acquire.
    fn connect(&mut self) -> Result<()>;

    fn try_acquire(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

// ----------------------------------------------------------------------------
// Synthetic source
// ----------------------------------------------------------------------------

/// Interval between simulated cell passages, in frames.
const PASSAGE_PERIOD: u64 = 50;
/// Frames a simulated cell stays in view while transiting.
const PASSAGE_TRANSIT_FRAMES: u64 = 4;
/// Flat background intensity.
const BACKGROUND_LEVEL: u8 = 16;

/// Synthetic frame source for tests, the demo, and headless runs.
///
/// Produces a flat background with per-pixel sensor noise, plus a bright
/// horizontal band that sweeps through the frame every `PASSAGE_PERIOD`
/// frames - a crude but serviceable imitation of a cell transiting the
/// channel. The band moves on every transit frame, so the frame-difference
/// signal stays elevated for the whole passage and drops back to the noise
/// floor afterwards.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    target_fps: u32,
    frame_cap: Option<u64>,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            target_fps: 0,
            frame_cap: None,
            frame_count: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Pace acquisition to roughly `fps` frames per second (0 = free-running).
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Stop yielding frames after `cap` acquisitions (bounded runs).
    pub fn with_frame_cap(mut self, cap: u64) -> Self {
        self.frame_cap = Some(cap);
        self
    }

    /// Seed the noise generator for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut pixels = vec![BACKGROUND_LEVEL; w * h];

        // Sensor noise floor, well below any sensible detection threshold.
        for p in pixels.iter_mut() {
            *p = p.saturating_add(self.rng.gen_range(0..8));
        }

        // Simulated cell: a bright band sweeping downward during the transit.
        let phase = self.frame_count % PASSAGE_PERIOD;
        if phase < PASSAGE_TRANSIT_FRAMES {
            let band_h = (h / 8).max(1);
            let band_top = (phase as usize * band_h) % h.saturating_sub(band_h).max(1);
            for row in band_top..(band_top + band_h).min(h) {
                for p in &mut pixels[row * w..(row + 1) * w] {
                    *p = self.rng.gen_range(200..=255);
                }
            }
        }

        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("synthetic source needs non-zero dimensions"));
        }
        log::info!(
            "SyntheticSource: connected ({}x{}, {} fps)",
            self.width,
            self.height,
            self.target_fps
        );
        Ok(())
    }

    fn try_acquire(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        if let Some(cap) = self.frame_cap {
            if self.frame_count >= cap {
                return Err(anyhow!("synthetic source exhausted after {} frames", cap));
            }
        }
        if self.target_fps > 0 {
            // Emulate the camera's cadence. Real sources block in the driver.
            std::thread::sleep(Duration::from_micros(1_000_000 / self.target_fps as u64));
        }
        let pixels = self.generate_pixels();
        let frame = Frame::new(pixels, self.width, self.height)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_acquired: self.frame_count,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_pixel_count() {
        assert!(Frame::new(vec![0; 10], 4, 4).is_err());
        assert!(Frame::new(vec![0; 16], 4, 4).is_ok());
    }

    #[test]
    fn frame_rejects_zero_dimensions() {
        assert!(Frame::new(vec![], 0, 4).is_err());
        assert!(Frame::new(vec![], 4, 0).is_err());
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(32, 24).with_seed(1);
        source.connect()?;
        let frame = source
            .try_acquire(Duration::from_millis(10))?
            .expect("synthetic source always yields");
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24);
        assert_eq!(frame.pixels().len(), 32 * 24);
        assert_eq!(source.stats().frames_acquired, 1);
        Ok(())
    }

    #[test]
    fn synthetic_source_honors_frame_cap() -> Result<()> {
        let mut source = SyntheticSource::new(8, 8).with_seed(2).with_frame_cap(3);
        source.connect()?;
        for _ in 0..3 {
            assert!(source.try_acquire(Duration::from_millis(1))?.is_some());
        }
        assert!(source.try_acquire(Duration::from_millis(1)).is_err());
        Ok(())
    }
}
