use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::roi::RoiFraction;

const DEFAULT_SOURCE_WIDTH: u32 = 128;
const DEFAULT_SOURCE_HEIGHT: u32 = 128;
const DEFAULT_TARGET_FPS: u32 = 60;
const DEFAULT_THRESHOLD: f64 = 10.0;
const DEFAULT_WINDOW_SECS: f64 = 10.0;
const DEFAULT_FAILURE_BUDGET: u32 = 30;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Deserialize, Default)]
struct CountdConfigFile {
    source: Option<SourceConfigFile>,
    roi: Option<RoiConfigFile>,
    detection: Option<DetectionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RoiConfigFile {
    x: Option<f64>,
    y: Option<f64>,
    w: Option<f64>,
    h: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    threshold: Option<f64>,
    window_secs: Option<f64>,
    failure_budget: Option<u32>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CountdConfig {
    pub source: SourceSettings,
    pub roi: RoiFraction,
    pub threshold: f64,
    /// Width of the scrolling trace window and of the rate-report interval.
    pub window_secs: f64,
    pub failure_budget: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Stop after this many frames (bounded runs); `None` = run until stopped.
    pub max_frames: Option<u64>,
}

impl CountdConfig {
    /// Load from the file named by `COUNTER_CONFIG` (if set), then apply
    /// `COUNTER_*` env overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COUNTER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CountdConfigFile) -> Self {
        let source = SourceSettings {
            width: file
                .source
                .as_ref()
                .and_then(|s| s.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|s| s.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
            target_fps: file
                .source
                .as_ref()
                .and_then(|s| s.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            max_frames: file.source.as_ref().and_then(|s| s.max_frames),
        };
        let roi = RoiFraction::clamped(
            file.roi.as_ref().and_then(|r| r.x).unwrap_or(0.0),
            file.roi.as_ref().and_then(|r| r.y).unwrap_or(0.0),
            file.roi.as_ref().and_then(|r| r.w).unwrap_or(1.0),
            file.roi.as_ref().and_then(|r| r.h).unwrap_or(1.0),
        );
        let detection = file.detection.unwrap_or_default();
        Self {
            source,
            roi,
            threshold: detection.threshold.unwrap_or(DEFAULT_THRESHOLD),
            window_secs: detection.window_secs.unwrap_or(DEFAULT_WINDOW_SECS),
            failure_budget: detection.failure_budget.unwrap_or(DEFAULT_FAILURE_BUDGET),
            acquire_timeout: Duration::from_millis(
                detection
                    .acquire_timeout_ms
                    .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(threshold) = std::env::var("COUNTER_THRESHOLD") {
            self.threshold = threshold
                .parse()
                .map_err(|_| anyhow!("COUNTER_THRESHOLD must be a number"))?;
        }
        if let Ok(window) = std::env::var("COUNTER_WINDOW_SECS") {
            self.window_secs = window
                .parse()
                .map_err(|_| anyhow!("COUNTER_WINDOW_SECS must be a number of seconds"))?;
        }
        if let Ok(budget) = std::env::var("COUNTER_FAILURE_BUDGET") {
            self.failure_budget = budget
                .parse()
                .map_err(|_| anyhow!("COUNTER_FAILURE_BUDGET must be an integer"))?;
        }
        if let Ok(roi) = std::env::var("COUNTER_ROI") {
            self.roi = parse_roi_csv(&roi)?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if !(self.window_secs > 0.0) {
            return Err(anyhow!("window_secs must be positive"));
        }
        if !(self.threshold >= 0.0) {
            return Err(anyhow!("threshold must be non-negative"));
        }
        if self.failure_budget == 0 {
            return Err(anyhow!("failure_budget must be at least 1"));
        }
        if self.acquire_timeout.is_zero() {
            return Err(anyhow!("acquire timeout must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CountdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// Parse "x,y,w,h" as ROI fractions (clamped to [0,1]).
fn parse_roi_csv(value: &str) -> Result<RoiFraction> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|entry| entry.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| anyhow!("COUNTER_ROI must be four comma-separated numbers"))?;
    if parts.len() != 4 {
        return Err(anyhow!(
            "COUNTER_ROI must be x,y,w,h - got {} values",
            parts.len()
        ));
    }
    Ok(RoiFraction::clamped(parts[0], parts[1], parts[2], parts[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = CountdConfig::from_file(CountdConfigFile::default());
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.source.width, DEFAULT_SOURCE_WIDTH);
        assert_eq!(cfg.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.window_secs, DEFAULT_WINDOW_SECS);
        assert_eq!(cfg.roi, RoiFraction::full());
    }

    #[test]
    fn roi_csv_parses_and_clamps() {
        let roi = parse_roi_csv("0.2, 0.3, 1.5, -0.1").unwrap();
        assert_eq!(roi, RoiFraction::clamped(0.2, 0.3, 1.5, -0.1));
        assert_eq!(roi.w, 1.0);
        assert_eq!(roi.h, 0.0);
        assert!(parse_roi_csv("0.1,0.2,0.3").is_err());
        assert!(parse_roi_csv("a,b,c,d").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = CountdConfig::from_file(CountdConfigFile::default());
        cfg.window_secs = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = CountdConfig::from_file(CountdConfigFile::default());
        cfg.source.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = CountdConfig::from_file(CountdConfigFile::default());
        cfg.failure_budget = 0;
        assert!(cfg.validate().is_err());
    }
}
