//! countd - cell passage counting daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured source on a producer thread
//! 2. Crops the operator's ROI and runs motion detection per frame
//! 3. Appends rising-edge detections to the event log
//! 4. Keeps the scrolling motion trace fresh for a renderer
//! 5. Reports the trailing cells-per-second rate once per window

use anyhow::Result;
use std::time::{Duration, Instant};

use cell_counter::{
    Controls, CountdConfig, DriverOptions, PipelineDriver, PipelineState, SyntheticSource,
};

const RENDER_INTERVAL: Duration = Duration::from_millis(30);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = CountdConfig::load()?;
    log::info!(
        "countd starting: source {}x{} @ {} fps, roi=({:.2},{:.2},{:.2},{:.2}), threshold={}, window={}s",
        cfg.source.width,
        cfg.source.height,
        cfg.source.target_fps,
        cfg.roi.x,
        cfg.roi.y,
        cfg.roi.w,
        cfg.roi.h,
        cfg.threshold,
        cfg.window_secs
    );

    let mut source = SyntheticSource::new(cfg.source.width, cfg.source.height)
        .with_target_fps(cfg.source.target_fps);
    if let Some(cap) = cfg.source.max_frames {
        source = source.with_frame_cap(cap);
    }

    let controls = Controls {
        roi: cfg.roi,
        threshold: cfg.threshold,
    };
    let mut pipeline = PipelineDriver::new(controls, cfg.window_secs)?;
    pipeline.start(
        Box::new(source),
        DriverOptions {
            acquire_timeout: cfg.acquire_timeout,
            failure_budget: cfg.failure_budget,
        },
    )?;

    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        stop.stop();
    })?;

    let mut last_report = Instant::now();
    let mut last_fps_frames = 0u64;
    let report_interval = Duration::from_secs_f64(cfg.window_secs);

    // Renderer + rate reporter, collapsed into one pull loop. A GUI would
    // run these on its own timers against the same pull API.
    while pipeline.state() == PipelineState::Running {
        std::thread::sleep(RENDER_INTERVAL);

        if let Some(sample) = pipeline.latest() {
            let snap = pipeline.trace().snapshot()?;
            log::trace!(
                "t={:.2}s motion={:.2} trace={}+{} pts",
                sample.time,
                sample.motion_amount,
                snap.active.len(),
                snap.standby.len()
            );
        }

        if last_report.elapsed() >= report_interval {
            let now = pipeline.now_secs();
            let rate = pipeline.events().rate(cfg.window_secs, now)?;
            let frames = pipeline.frames_processed();
            let fps = (frames - last_fps_frames) as f64 / last_report.elapsed().as_secs_f64();
            last_fps_frames = frames;
            last_report = Instant::now();
            log::info!(
                "cells/sec over last {:.0}s: {:.3} (total detected {}, {:.1} fps)",
                cfg.window_secs,
                rate,
                pipeline.events().len()?,
                fps
            );
        }
    }

    pipeline.join()?;

    println!("countd summary:");
    println!("  frames processed: {}", pipeline.frames_processed());
    println!("  cells detected: {}", pipeline.events().len()?);
    if let Some(sample) = pipeline.latest() {
        println!("  last sample: t={:.2}s motion={:.2}", sample.time, sample.motion_amount);
    }
    Ok(())
}
