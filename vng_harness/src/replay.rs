//! Offline replay of recorded or synthetic frames through an [`EyePipeline`].

use std::io::{BufRead, Write};

use pupil_signal::{EyeFrame, EyeOutput, EyePipeline};
use serde::Serialize;

/// Aggregate numbers for one replay run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub frames: usize,
    pub detected_frames: usize,
    /// Blink onsets seen (open to blinking transitions)
    pub blinks: usize,
    pub stable_frames: usize,
    /// Frames for which the pipeline reported no position
    pub unpositioned_frames: usize,
}

impl ReplaySummary {
    /// Fraction of frames reported as a stable fixation
    pub fn stable_fraction(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.stable_frames as f64 / self.frames as f64
    }

    fn record(&mut self, frame: &EyeFrame, output: &EyeOutput) {
        self.frames += 1;
        if frame.is_detected() {
            self.detected_frames += 1;
        }
        if output.blink_changed && output.blinking {
            self.blinks += 1;
        }
        if output.stable {
            self.stable_frames += 1;
        }
        if output.position.is_none() {
            self.unpositioned_frames += 1;
        }
    }
}

/// Read one JSON [`EyeFrame`] per line; blank lines are skipped
pub fn read_frames<R: BufRead>(reader: R) -> Result<Vec<EyeFrame>, Box<dyn std::error::Error>> {
    let mut frames = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: EyeFrame = serde_json::from_str(&line)
            .map_err(|e| format!("Line {}: invalid frame: {e}", line_no + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Run frames through the pipeline, writing one JSON [`EyeOutput`] per line
pub fn replay<I, W>(
    pipeline: &mut EyePipeline,
    frames: I,
    mut output: W,
) -> Result<ReplaySummary, Box<dyn std::error::Error>>
where
    I: IntoIterator<Item = EyeFrame>,
    W: Write,
{
    let mut summary = ReplaySummary::default();

    for frame in frames {
        let result = pipeline.process(&frame);
        summary.record(&frame, &result);
        serde_json::to_writer(&mut output, &result)?;
        writeln!(output)?;
    }

    output.flush()?;
    log::info!(
        "Replayed {} frames, {} blinks, {:.1}% stable",
        summary.frames,
        summary.blinks,
        summary.stable_fraction() * 100.0
    );
    Ok(summary)
}
