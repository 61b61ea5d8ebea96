//! Scrolling time-window buffer for the live motion trace.
//!
//! The renderer shows a sweep-style trace: a marker advances across a fixed
//! window, new points fill in behind it, and what is left of the previous
//! window shrinks ahead of it. Two point generations alternate to make that
//! cheap - when time passes the right edge of the active window the
//! generations swap, the newly active one is cleared, and the now-standby
//! generation is eaten from the front as the marker approaches, rather than
//! vanishing in one cut.
//!
//! Generations are deques so eviction pops from the front in O(evicted)
//! instead of shifting the series. Appends, purges, and snapshots each take
//! one short lock; the producer and the renderer never contend for longer
//! than a copy of one window's points.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

/// Fraction of the window width that standby points are allowed to trail
/// behind the visible window before being purged.
const PURGE_MARGIN_FRAC: f64 = 0.05;

/// One plotted point. `event` marks samples that fired a detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TracePoint {
    pub time: f64,
    pub value: f64,
    pub event: bool,
}

/// Read-only copy of both generations for the renderer.
#[derive(Clone, Debug)]
pub struct TraceSnapshot {
    pub active: Vec<TracePoint>,
    pub standby: Vec<TracePoint>,
    /// Left edge of the active window (seconds).
    pub window_start: f64,
    pub window_width: f64,
}

impl TraceSnapshot {
    pub fn total_points(&self) -> usize {
        self.active.len() + self.standby.len()
    }
}

struct TraceInner {
    active: VecDeque<TracePoint>,
    standby: VecDeque<TracePoint>,
    active_start: f64,
}

/// Double-buffered scrolling point series. Mutated only by the pipeline
/// thread; snapshotted by the renderer on its own schedule.
pub struct ScrollingWindowBuffer {
    inner: Mutex<TraceInner>,
    window_width: f64,
}

impl ScrollingWindowBuffer {
    /// `window_width` is the visible trace span in seconds; must be positive.
    pub fn new(window_width: f64) -> Result<Self> {
        if !(window_width > 0.0) {
            return Err(anyhow!(
                "trace window width must be positive, got {}",
                window_width
            ));
        }
        Ok(Self {
            inner: Mutex::new(TraceInner {
                active: VecDeque::new(),
                standby: VecDeque::new(),
                active_start: 0.0,
            }),
            window_width,
        })
    }

    pub fn window_width(&self) -> f64 {
        self.window_width
    }

    /// Append a point to the active generation, swapping generations when
    /// `time` passes the right edge of the active window.
    ///
    /// Times must be non-decreasing (single producer). A gap larger than one
    /// window drops both generations: nothing recorded before the gap can
    /// still be visible.
    pub fn push(&self, time: f64, value: f64, event: bool) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("trace buffer lock poisoned"))?;
        let inner = &mut *guard;
        let w = self.window_width;

        if time > inner.active_start + w {
            std::mem::swap(&mut inner.active, &mut inner.standby);
            inner.active.clear();
            inner.active_start += w;
            if time > inner.active_start + w {
                inner.standby.clear();
                while time > inner.active_start + w {
                    inner.active_start += w;
                }
            }
        }

        inner.active.push_back(TracePoint { time, value, event });
        Ok(())
    }

    /// Evict standby points that have scrolled past the trailing margin,
    /// so the old trace shrinks gradually instead of disappearing at the
    /// swap. Bounded by the points actually evicted.
    pub fn purge_expired(&self, now: f64) -> Result<()> {
        let cutoff = now - self.window_width * (1.0 - PURGE_MARGIN_FRAC);
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("trace buffer lock poisoned"))?;
        while inner.standby.front().is_some_and(|p| p.time <= cutoff) {
            inner.standby.pop_front();
        }
        Ok(())
    }

    /// Copy both generations for rendering. Points are inserted whole under
    /// the same lock, so a snapshot never observes a torn append.
    pub fn snapshot(&self) -> Result<TraceSnapshot> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("trace buffer lock poisoned"))?;
        Ok(TraceSnapshot {
            active: inner.active.iter().copied().collect(),
            standby: inner.standby.iter().copied().collect(),
            window_start: inner.active_start,
            window_width: self.window_width,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_accumulate_in_active_generation() {
        let buf = ScrollingWindowBuffer::new(10.0).unwrap();
        for i in 0..5 {
            buf.push(i as f64, i as f64 * 2.0, false).unwrap();
        }
        let snap = buf.snapshot().unwrap();
        assert_eq!(snap.active.len(), 5);
        assert!(snap.standby.is_empty());
        assert_eq!(snap.window_start, 0.0);
    }

    #[test]
    fn crossing_the_window_edge_swaps_generations() {
        let buf = ScrollingWindowBuffer::new(1.0).unwrap();
        buf.push(0.5, 1.0, false).unwrap();
        buf.push(1.2, 2.0, true).unwrap();

        let snap = buf.snapshot().unwrap();
        assert_eq!(snap.window_start, 1.0);
        assert_eq!(snap.active.len(), 1);
        assert_eq!(snap.active[0].time, 1.2);
        assert!(snap.active[0].event);
        // Previous window retained as standby, not cleared.
        assert_eq!(snap.standby.len(), 1);
        assert_eq!(snap.standby[0].time, 0.5);
    }

    #[test]
    fn active_points_stay_within_active_window() {
        let buf = ScrollingWindowBuffer::new(2.0).unwrap();
        let mut t = 0.0;
        while t < 7.0 {
            buf.push(t, 1.0, false).unwrap();
            let snap = buf.snapshot().unwrap();
            for p in &snap.active {
                assert!(p.time >= snap.window_start, "{} < {}", p.time, snap.window_start);
                assert!(p.time <= snap.window_start + 2.0);
            }
            t += 0.1;
        }
    }

    #[test]
    fn purge_shrinks_standby_gradually() {
        let buf = ScrollingWindowBuffer::new(1.0).unwrap();
        let mut t = 0.0;
        while t <= 0.9 {
            buf.push(t, 1.0, false).unwrap();
            t += 0.1;
        }
        buf.push(1.05, 1.0, false).unwrap(); // swap; old window on standby

        // Just after the swap the margin keeps everything but the very
        // oldest points.
        buf.purge_expired(1.05).unwrap();
        let early = buf.snapshot().unwrap().standby.len();
        assert!(early > 0);

        // Later in the window, more of the standby trace has expired.
        buf.purge_expired(1.6).unwrap();
        let later = buf.snapshot().unwrap().standby.len();
        assert!(later < early, "{} !< {}", later, early);

        // Nothing older than the trailing margin survives a purge.
        let snap = buf.snapshot().unwrap();
        for p in snap.standby.iter().chain(snap.active.iter()) {
            assert!(p.time > 1.6 - 1.0 * (1.0 - PURGE_MARGIN_FRAC) - 1e-9);
        }
    }

    #[test]
    fn combined_size_stays_bounded_across_many_windows() {
        // 3x the window width of points at a fixed cadence must never grow
        // past ~two generations' worth.
        let width = 1.0;
        let step = 0.01;
        let per_window = (width / step) as usize;
        let buf = ScrollingWindowBuffer::new(width).unwrap();

        let mut t = 0.0;
        let mut max_points = 0;
        while t < 3.0 * width {
            buf.push(t, (t * 10.0).sin(), false).unwrap();
            buf.purge_expired(t).unwrap();
            max_points = max_points.max(buf.snapshot().unwrap().total_points());
            t += step;
        }
        assert!(
            max_points <= 2 * per_window + 2,
            "snapshot grew to {} points",
            max_points
        );
    }

    #[test]
    fn gap_larger_than_a_window_drops_stale_points() {
        let buf = ScrollingWindowBuffer::new(1.0).unwrap();
        buf.push(0.1, 1.0, false).unwrap();
        buf.push(5.3, 2.0, false).unwrap();

        let snap = buf.snapshot().unwrap();
        assert_eq!(snap.window_start, 5.0);
        assert_eq!(snap.active.len(), 1);
        assert!(snap.standby.is_empty());
    }

    #[test]
    fn rejects_non_positive_window() {
        assert!(ScrollingWindowBuffer::new(0.0).is_err());
        assert!(ScrollingWindowBuffer::new(-1.0).is_err());
        assert!(ScrollingWindowBuffer::new(f64::NAN).is_err());
    }
}
