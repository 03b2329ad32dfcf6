//! Real-time signal conditioning for video-nystagmography pupil tracking.
//!
//! Raw per-frame pupil detections are turned into a clean position signal and
//! blink intervals:
//!
//! - [`pupil_filter`] fills short detection gaps and smooths one axis
//! - [`tracker`] rejects single-frame jumps and stabilizes fixations
//! - [`blink`] turns the detection flag into blink intervals
//! - [`pipeline`] wires them together per eye
//!
//! All processing is single-threaded, one frame at a time.

pub mod blink;
pub mod config;
pub mod config_storage;
pub mod pipeline;
pub mod pupil_filter;
pub mod ring_buffer;
pub mod sample;
pub mod smoothing;
pub mod tracker;

pub use blink::{
    BinocularBlinkDetector, BlinkConfig, BlinkInterval, BlinkReport, BlinkStateMachine,
    BlinkStatistics, EyeState,
};
pub use config::{ConfigError, PipelineConfig, PipelineMode};
pub use config_storage::ConfigStorage;
pub use pipeline::{BinocularPipeline, EyeOutput, EyePipeline};
pub use pupil_filter::{FilterConfig, FilterStatus, PupilFilter};
pub use sample::{EyeFrame, PixelCircle, PupilCircle, Sample};
pub use smoothing::FilterKind;
pub use tracker::{PrecisionTracker, TrackerConfig};
