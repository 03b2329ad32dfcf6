//! VNG harness for exercising the pupil signal pipeline offline
//!
//! Provides a synthetic nystagmus generator and a JSONL replay driver so the
//! filter, tracker and blink detector can be tuned without a camera.

pub mod replay;
pub mod synthetic;

pub use replay::{read_frames, replay, ReplaySummary};
pub use synthetic::{NystagmusConfig, NystagmusGenerator};
