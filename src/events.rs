//! Append-only detection event log.
//!
//! Every rising-edge detection appends one timestamp. The single producer
//! guarantees non-decreasing order; the log itself only guards against
//! concurrent readers. Entries are never deleted - event rates in this
//! domain are a few per second at most, so an unbounded in-memory log is
//! fine for the process lifetime.

use std::sync::Mutex;

use anyhow::{anyhow, Result};

/// Thread-safe ordered record of detection timestamps.
pub struct EventLog {
    events: Mutex<Vec<f64>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Append a detection timestamp. The caller (the single pipeline
    /// producer) guarantees timestamps are non-decreasing.
    pub fn append(&self, timestamp: f64) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        events.push(timestamp);
        Ok(())
    }

    /// Number of events with `timestamp >= start`.
    pub fn count_since(&self, start: f64) -> Result<usize> {
        let events = self
            .events
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        // Sorted by construction, so the boundary is a binary search away.
        let first = events.partition_point(|&t| t < start);
        Ok(events.len() - first)
    }

    /// Events per second over the trailing `interval_secs` window ending at
    /// `now`. A non-positive interval is a caller bug, not a clamp case.
    pub fn rate(&self, interval_secs: f64, now: f64) -> Result<f64> {
        if !(interval_secs > 0.0) {
            return Err(anyhow!(
                "rate interval must be positive, got {}",
                interval_secs
            ));
        }
        let count = self.count_since(now - interval_secs)?;
        Ok(count as f64 / interval_secs)
    }

    /// Total events recorded since startup.
    pub fn len(&self) -> Result<usize> {
        let events = self
            .events
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        Ok(events.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(timestamps: &[f64]) -> EventLog {
        let log = EventLog::new();
        for &t in timestamps {
            log.append(t).unwrap();
        }
        log
    }

    #[test]
    fn count_since_uses_inclusive_start() {
        let log = log_with(&[1.0, 2.0, 3.0, 11.0]);
        assert_eq!(log.count_since(2.0).unwrap(), 3);
        assert_eq!(log.count_since(11.0).unwrap(), 1);
        assert_eq!(log.count_since(11.5).unwrap(), 0);
    }

    #[test]
    fn rate_over_trailing_window() {
        // Events at {1, 2, 3, 11}; rate(10, now=12) counts [2, 12] -> 2
        // events -> 0.2/s.
        let log = log_with(&[1.0, 2.0, 3.0, 11.0]);
        let rate = log.rate(10.0, 12.0).unwrap();
        assert!((rate - 0.2).abs() < 1e-12, "rate = {}", rate);
    }

    #[test]
    fn empty_log_rates_zero() {
        let log = EventLog::new();
        assert_eq!(log.rate(10.0, 100.0).unwrap(), 0.0);
        assert!(log.is_empty().unwrap());
        assert_eq!(log.len().unwrap(), 0);
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let log = log_with(&[1.0]);
        assert!(log.rate(0.0, 10.0).is_err());
        assert!(log.rate(-5.0, 10.0).is_err());
        assert!(log.rate(f64::NAN, 10.0).is_err());
    }
}
