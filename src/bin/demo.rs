//! demo - end-to-end synthetic run of the counting pipeline

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::{Duration, Instant};

use cell_counter::{
    Controls, DriverOptions, PipelineDriver, PipelineState, RoiFraction, SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to process.
    #[arg(long, default_value_t = 300)]
    frames: u64,
    /// Frames per second for the synthetic source (0 = free-running).
    #[arg(long, default_value_t = 0)]
    fps: u32,
    /// Frame width in pixels.
    #[arg(long, default_value_t = 128)]
    width: u32,
    /// Frame height in pixels.
    #[arg(long, default_value_t = 128)]
    height: u32,
    /// Motion threshold for the rising-edge trigger.
    #[arg(long, default_value_t = 10.0)]
    threshold: f64,
    /// Trace window width in seconds.
    #[arg(long, default_value_t = 10.0)]
    window: f64,
    /// Deterministic seed for the synthetic noise.
    #[arg(long, env = "COUNTER_SEED")]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    stage("start pipeline on synthetic source");
    let mut source = SyntheticSource::new(args.width, args.height)
        .with_target_fps(args.fps)
        .with_frame_cap(args.frames);
    if let Some(seed) = args.seed {
        source = source.with_seed(seed);
    }

    let controls = Controls {
        roi: RoiFraction::full(),
        threshold: args.threshold,
    };
    let mut pipeline = PipelineDriver::new(controls, args.window)?;
    pipeline.start(
        Box::new(source),
        DriverOptions {
            acquire_timeout: Duration::from_millis(100),
            failure_budget: 3,
        },
    )?;

    stage("process frames");
    let deadline = Instant::now() + Duration::from_secs(120);
    while pipeline.state() == PipelineState::Running {
        if Instant::now() > deadline {
            pipeline.stop();
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pipeline.join()?;

    stage("summarize");
    let elapsed = pipeline.now_secs();
    let events = pipeline.events().len()?;
    let snap = pipeline.trace().snapshot()?;
    let mean_rate = if elapsed > 0.0 {
        events as f64 / elapsed
    } else {
        0.0
    };

    println!("demo summary:");
    println!("  frames processed: {}", pipeline.frames_processed());
    println!("  cells detected: {}", events);
    println!("  elapsed: {:.2}s (mean {:.3} cells/sec)", elapsed, mean_rate);
    println!(
        "  trace points: {} active + {} standby",
        snap.active.len(),
        snap.standby.len()
    );
    if let Some(sample) = pipeline.latest() {
        println!(
            "  last sample: t={:.3}s motion={:.2} detected={}",
            sample.time, sample.motion_amount, sample.cell_detected
        );
    }
    println!("next steps:");
    println!("  RUST_LOG=debug cargo run --bin countd");
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
