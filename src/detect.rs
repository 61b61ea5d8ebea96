//! Frame-differencing motion detection with a rising-edge event trigger.
//!
//! The detector keeps the previous ROI buffer as its baseline, reduces the
//! pixel-wise difference against the current buffer to a scalar motion
//! magnitude, and fires a detection only on the transition from at-or-below
//! the threshold to strictly above it. A cell that keeps the signal high for
//! several frames is still one cell; the trigger re-arms only once the
//! signal falls back to or below the threshold.
//!
//! The magnitude is the *mean* absolute pixel difference, so the same
//! threshold keeps its meaning when the operator resizes the ROI. The sum is
//! accumulated in `u64` (exact for any realistic buffer) and divided once,
//! which makes the result deterministic for identical inputs.

use crate::roi::RoiRegion;

/// One processed frame's worth of motion data. Immutable once produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionSample {
    /// Seconds since pipeline start.
    pub time: f64,
    /// Mean absolute pixel difference against the previous ROI buffer.
    pub motion_amount: f64,
    /// True only on the rising edge of the threshold crossing.
    pub cell_detected: bool,
}

/// Stateful motion detector. Single-owner; driven by the pipeline thread.
pub struct MotionDetector {
    baseline: Option<RoiRegion>,
    above_threshold: bool,
    detected_total: u64,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self {
            baseline: None,
            above_threshold: false,
            detected_total: 0,
        }
    }

    /// Process one ROI buffer. Takes ownership: the buffer becomes the next
    /// baseline, so no aliasing survives the call.
    ///
    /// A missing baseline or a dimension change (operator moved the ROI
    /// mid-stream) resets the detector instead of erroring: motion reads 0,
    /// nothing is detected, and the current buffer seeds the new baseline.
    pub fn process(&mut self, region: RoiRegion, timestamp: f64, threshold: f64) -> MotionSample {
        let motion_amount = match &self.baseline {
            Some(prev)
                if prev.rect.width() == region.rect.width()
                    && prev.rect.height() == region.rect.height() =>
            {
                mean_abs_diff(&prev.pixels, &region.pixels)
            }
            _ => 0.0,
        };

        let above = motion_amount > threshold;
        let cell_detected = above && !self.above_threshold;
        self.above_threshold = above;
        self.baseline = Some(region);

        if cell_detected {
            self.detected_total += 1;
        }

        MotionSample {
            time: timestamp,
            motion_amount,
            cell_detected,
        }
    }

    /// Number of rising edges seen since construction.
    pub fn detected_total(&self) -> u64 {
        self.detected_total
    }

    /// Drop the baseline and re-arm the trigger.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.above_threshold = false;
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_abs_diff(prev: &[u8], cur: &[u8]) -> f64 {
    debug_assert_eq!(prev.len(), cur.len());
    if cur.is_empty() {
        return 0.0;
    }
    let sum: u64 = prev
        .iter()
        .zip(cur.iter())
        .map(|(a, b)| a.abs_diff(*b) as u64)
        .sum();
    sum as f64 / cur.len() as f64
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::RoiRegion;

    fn region(level: u8) -> RoiRegion {
        RoiRegion::from_pixels(vec![level; 64], 8, 8)
    }

    /// diff(A,A) = 0, diff(A,B) = 50 with these two levels.
    const LEVEL_A: u8 = 10;
    const LEVEL_B: u8 = 60;

    #[test]
    fn first_frame_is_baseline_only() {
        let mut det = MotionDetector::new();
        let s = det.process(region(LEVEL_A), 0.0, 10.0);
        assert_eq!(s.motion_amount, 0.0);
        assert!(!s.cell_detected);
    }

    #[test]
    fn end_to_end_edge_semantics() {
        // ROI sequence [A, A, B, A], threshold 10:
        // motion [0, 0, 50, 50], detected [false, false, true, false].
        // The second 50 is not a new rising edge - the signal never dropped
        // back to the threshold in between.
        let mut det = MotionDetector::new();
        let inputs = [LEVEL_A, LEVEL_A, LEVEL_B, LEVEL_A];
        let samples: Vec<MotionSample> = inputs
            .iter()
            .enumerate()
            .map(|(i, &level)| det.process(region(level), i as f64, 10.0))
            .collect();

        let motions: Vec<f64> = samples.iter().map(|s| s.motion_amount).collect();
        let detected: Vec<bool> = samples.iter().map(|s| s.cell_detected).collect();
        assert_eq!(motions, vec![0.0, 0.0, 50.0, 50.0]);
        assert_eq!(detected, vec![false, false, true, false]);
        assert_eq!(det.detected_total(), 1);
    }

    #[test]
    fn sustained_signal_fires_exactly_once() {
        let mut det = MotionDetector::new();
        det.process(region(LEVEL_A), 0.0, 10.0);
        // Alternate A/B so every frame differs from its predecessor by 50.
        let mut events = 0;
        for i in 0..20 {
            let level = if i % 2 == 0 { LEVEL_B } else { LEVEL_A };
            if det.process(region(level), 1.0 + i as f64, 10.0).cell_detected {
                events += 1;
            }
        }
        assert_eq!(events, 1);
    }

    #[test]
    fn falling_below_re_arms_the_trigger() {
        let mut det = MotionDetector::new();
        let sequence = [
            LEVEL_A, // baseline
            LEVEL_B, // rising edge -> event 1
            LEVEL_B, // diff 0, re-armed
            LEVEL_A, // rising edge -> event 2
        ];
        let events: usize = sequence
            .iter()
            .enumerate()
            .map(|(i, &level)| det.process(region(level), i as f64, 10.0).cell_detected as usize)
            .sum();
        assert_eq!(events, 2);
        assert_eq!(det.detected_total(), 2);
    }

    #[test]
    fn exact_threshold_does_not_fire() {
        // Crossing must be *strictly* above the threshold.
        let mut det = MotionDetector::new();
        det.process(region(0), 0.0, 50.0);
        let s = det.process(region(50), 1.0, 50.0);
        assert_eq!(s.motion_amount, 50.0);
        assert!(!s.cell_detected);
    }

    #[test]
    fn dimension_change_resets_baseline() {
        let mut det = MotionDetector::new();
        det.process(region(LEVEL_A), 0.0, 10.0);
        // Operator shrank the ROI: different buffer size, must not diff.
        let smaller = RoiRegion::from_pixels(vec![LEVEL_B; 16], 4, 4);
        let s = det.process(smaller, 1.0, 10.0);
        assert_eq!(s.motion_amount, 0.0);
        assert!(!s.cell_detected);
        // Next same-sized frame diffs against the new baseline.
        let s = det.process(RoiRegion::from_pixels(vec![LEVEL_A; 16], 4, 4), 2.0, 10.0);
        assert_eq!(s.motion_amount, 50.0);
        assert!(s.cell_detected);
    }

    #[test]
    fn identical_inputs_produce_identical_samples() {
        let inputs: Vec<Vec<u8>> = (0..32)
            .map(|i| (0..64).map(|j| ((i * 37 + j * 11) % 256) as u8).collect())
            .collect();

        let run = || -> Vec<MotionSample> {
            let mut det = MotionDetector::new();
            inputs
                .iter()
                .enumerate()
                .map(|(i, px)| {
                    det.process(RoiRegion::from_pixels(px.clone(), 8, 8), i as f64, 12.5)
                })
                .collect()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn mean_abs_diff_is_exact_for_large_buffers() {
        // 10^6 pixels of constant difference must reduce without drift.
        let prev = vec![0u8; 1_000_000];
        let cur = vec![255u8; 1_000_000];
        assert_eq!(mean_abs_diff(&prev, &cur), 255.0);
    }
}
