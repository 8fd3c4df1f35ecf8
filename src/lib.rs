// src/lib.rs
//! Burns thermoelectric-probe measurements onto the video of the same run.
//!
//! A job loads a `.tda` or `.vtaz` series, walks the video frame by frame,
//! picks the sample each frame shows and draws the readings on top before
//! handing the frame to the encoder. [`engine::run`] drives it on a worker
//! thread and reports through [`JobEvent`]s.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod export;
pub mod measurement;
pub mod pipeline;
pub mod render;
pub mod sync;
pub mod types;
pub use config::JobSpec;
pub use engine::{run, spawn_with, JobHandle};
pub use error::{ErrorKind, OverlayError, Result};
pub use measurement::{MeasurementSeries, Sample};
pub use types::{CancelToken, JobEvent, JobOutcome, PipelineState, RunSummary};
