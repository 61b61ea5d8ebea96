//! cell-counter - motion-triggered cell passage counting.
//!
//! Counts discrete "cell passage" events in a live stream of grayscale
//! frames from a region of interest on a moving sample, and feeds two live
//! traces: the raw motion signal and the events-per-interval rate.
//!
//! Pipeline, one producer thread end to end:
//!
//! ```text
//! FrameSource -> ROI crop -> MotionDetector -> { EventLog, trace buffer }
//!                                           -> latest sample/frame slot
//! ```
//!
//! Consumers (a renderer, a rate reporter) run on their own timers and only
//! ever pull: `latest()` / `latest_frame()` for the freshest sample,
//! `snapshot()` for the scrolling trace, `rate()` for events per second.
//! Nothing a consumer does can block the camera for more than one short
//! critical section.
//!
//! - `frame` - frames and the acquisition boundary (`FrameSource`)
//! - `roi` - fractional ROI resolution and cropping
//! - `detect` - frame differencing + rising-edge event trigger
//! - `events` - append-only detection log with windowed rate queries
//! - `trace` - double-buffered scrolling window for the motion trace
//! - `pipeline` - the producer thread and its lifecycle
//! - `config` - countd configuration (file + env)

pub mod config;
pub mod detect;
pub mod events;
pub mod frame;
pub mod pipeline;
pub mod roi;
pub mod trace;

pub use config::{CountdConfig, SourceSettings};
pub use detect::{MotionDetector, MotionSample};
pub use events::EventLog;
pub use frame::{Frame, FrameSource, SourceStats, SyntheticSource};
pub use pipeline::{Controls, DriverOptions, PipelineDriver, PipelineState, StopHandle};
pub use roi::{RoiFraction, RoiRect, RoiRegion};
pub use trace::{ScrollingWindowBuffer, TracePoint, TraceSnapshot};
