//! Pipeline driver: one producer thread, pull-based consumers.
//!
//! The producer runs a tight loop - acquire, crop, detect, record, publish -
//! and may only block inside frame acquisition. Consumers (renderer, rate
//! reporter) never push into the pipeline; they read the latest published
//! sample/frame and trace snapshots on their own timers. There is no queue:
//! the latest slot is overwritten each cycle, so a slow consumer misses
//! intermediate frames instead of stalling the camera. Freshness over
//! completeness, by contract.
//!
//! Lifecycle is `Idle -> Running -> Stopped`. `Stopped` is reached on
//! explicit stop, or when acquisition fails more than `failure_budget` times
//! in a row (source unplugged or exhausted).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::detect::{MotionDetector, MotionSample};
use crate::events::EventLog;
use crate::frame::{Frame, FrameSource};
use crate::roi::{self, RoiFraction};
use crate::trace::ScrollingWindowBuffer;

/// Driver lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopped,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelineState::Running,
            2 => PipelineState::Stopped,
            _ => PipelineState::Idle,
        }
    }
}

/// Live operator inputs, re-read by the producer every frame.
#[derive(Clone, Copy, Debug)]
pub struct Controls {
    pub roi: RoiFraction,
    pub threshold: f64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            roi: RoiFraction::full(),
            threshold: 10.0,
        }
    }
}

/// Acquisition policy for the producer loop.
#[derive(Clone, Copy, Debug)]
pub struct DriverOptions {
    /// Upper bound on one blocking acquire call.
    pub acquire_timeout: Duration,
    /// Consecutive acquisition failures/timeouts tolerated before stopping.
    pub failure_budget: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_millis(500),
            failure_budget: 30,
        }
    }
}

struct PipelineShared {
    stop: AtomicBool,
    state: AtomicU8,
    controls: Mutex<Controls>,
    /// Single-slot overwrite cell: most-recent sample + frame wins.
    latest: Mutex<Option<(MotionSample, Frame)>>,
    frames_processed: AtomicU64,
    started: Instant,
}

/// Cloneable handle for stopping the pipeline from another context
/// (signal handlers, UI).
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<PipelineShared>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }
}

/// Owns the producer thread and the shared pipeline state.
pub struct PipelineDriver {
    shared: Arc<PipelineShared>,
    events: Arc<EventLog>,
    trace: Arc<ScrollingWindowBuffer>,
    join: Option<JoinHandle<()>>,
}

impl PipelineDriver {
    pub fn new(controls: Controls, window_secs: f64) -> Result<Self> {
        Ok(Self {
            shared: Arc::new(PipelineShared {
                stop: AtomicBool::new(false),
                state: AtomicU8::new(PipelineState::Idle as u8),
                controls: Mutex::new(controls),
                latest: Mutex::new(None),
                frames_processed: AtomicU64::new(0),
                started: Instant::now(),
            }),
            events: Arc::new(EventLog::new()),
            trace: Arc::new(ScrollingWindowBuffer::new(window_secs)?),
            join: None,
        })
    }

    /// Connect the source and spawn the producer thread.
    ///
    /// If the source reports unavailable the driver stays `Idle` and the
    /// error is returned to the caller - an operator problem, not a
    /// pipeline failure.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>, opts: DriverOptions) -> Result<()> {
        if self.state() != PipelineState::Idle {
            return Err(anyhow!("pipeline already started"));
        }
        if opts.failure_budget == 0 {
            return Err(anyhow!("failure budget must be at least 1"));
        }
        source.connect()?;

        self.shared
            .state
            .store(PipelineState::Running as u8, Ordering::SeqCst);

        let shared = self.shared.clone();
        let events = self.events.clone();
        let trace = self.trace.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_producer(&shared, &events, &trace, source.as_mut(), opts) {
                log::error!("pipeline producer stopped: {}", err);
            }
            shared
                .state
                .store(PipelineState::Stopped as u8, Ordering::SeqCst);
        });
        self.join = Some(join);
        log::info!("pipeline running");
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Request the producer to stop at the top of its next iteration.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    /// Wait for the producer thread to exit. The latest published sample
    /// survives the stop.
    pub fn join(&mut self) -> Result<()> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("pipeline producer thread panicked"))?;
        }
        Ok(())
    }

    /// Most recent motion sample, if any frame has been processed.
    pub fn latest(&self) -> Option<MotionSample> {
        self.shared
            .latest
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|(sample, _)| *sample))
    }

    /// Most recent full frame (cheap `Arc` clone of the pixel data).
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared
            .latest
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|(_, frame)| frame.clone()))
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn trace(&self) -> &Arc<ScrollingWindowBuffer> {
        &self.trace
    }

    pub fn frames_processed(&self) -> u64 {
        self.shared.frames_processed.load(Ordering::Relaxed)
    }

    /// Seconds since the driver was created; the producer's timestamps use
    /// the same clock.
    pub fn now_secs(&self) -> f64 {
        self.shared.started.elapsed().as_secs_f64()
    }

    pub fn set_roi(&self, roi: RoiFraction) -> Result<()> {
        let mut controls = self
            .shared
            .controls
            .lock()
            .map_err(|_| anyhow!("controls lock poisoned"))?;
        controls.roi = roi;
        Ok(())
    }

    pub fn set_threshold(&self, threshold: f64) -> Result<()> {
        let mut controls = self
            .shared
            .controls
            .lock()
            .map_err(|_| anyhow!("controls lock poisoned"))?;
        controls.threshold = threshold;
        Ok(())
    }
}

impl Drop for PipelineDriver {
    fn drop(&mut self) {
        self.stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run_producer(
    shared: &PipelineShared,
    events: &EventLog,
    trace: &ScrollingWindowBuffer,
    source: &mut dyn FrameSource,
    opts: DriverOptions,
) -> Result<()> {
    let mut detector = MotionDetector::new();
    let mut consecutive_failures = 0u32;

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            log::info!("pipeline stop requested");
            break;
        }

        let frame = match source.try_acquire(opts.acquire_timeout) {
            Ok(Some(frame)) => {
                consecutive_failures = 0;
                frame
            }
            Ok(None) => {
                consecutive_failures += 1;
                log::debug!(
                    "frame acquisition timed out ({}/{})",
                    consecutive_failures,
                    opts.failure_budget
                );
                if consecutive_failures >= opts.failure_budget {
                    return Err(anyhow!(
                        "no frame within {} consecutive acquisition timeouts",
                        opts.failure_budget
                    ));
                }
                continue;
            }
            Err(err) => {
                consecutive_failures += 1;
                log::warn!(
                    "frame acquisition failed ({}/{}): {}",
                    consecutive_failures,
                    opts.failure_budget,
                    err
                );
                if consecutive_failures >= opts.failure_budget {
                    return Err(err.context("acquisition failure budget exhausted"));
                }
                continue;
            }
        };

        let (roi_fraction, threshold) = {
            let controls = shared
                .controls
                .lock()
                .map_err(|_| anyhow!("controls lock poisoned"))?;
            (controls.roi, controls.threshold)
        };

        let region = roi::extract(&frame, &roi_fraction);
        let timestamp = shared.started.elapsed().as_secs_f64();
        let sample = detector.process(region, timestamp, threshold);

        if sample.cell_detected {
            events.append(sample.time)?;
            log::debug!(
                "cell detected at t={:.3}s (motion {:.2}, total {})",
                sample.time,
                sample.motion_amount,
                detector.detected_total()
            );
        }
        trace.push(sample.time, sample.motion_amount, sample.cell_detected)?;
        trace.purge_expired(sample.time)?;

        {
            let mut slot = shared
                .latest
                .lock()
                .map_err(|_| anyhow!("latest slot lock poisoned"))?;
            *slot = Some((sample, frame));
        }
        shared.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
