//! Per-eye composition of the filter, tracker and blink state machine.
//!
//! Every frame feeds the blink state machine with the raw detection flag. The
//! reported position comes from either the per-axis filters or the precision
//! tracker depending on [`PipelineMode`]. Both position paths are kept warm so a
//! mode change takes effect without a settling period.

use serde::{Deserialize, Serialize};

use crate::blink::{BlinkInterval, BlinkStateMachine};
use crate::config::{ConfigError, PipelineConfig, PipelineMode};
use crate::pupil_filter::PupilFilter;
use crate::sample::EyeFrame;
use crate::tracker::PrecisionTracker;

/// Pipeline output for one eye and one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeOutput {
    pub timestamp: f64,
    /// Pupil centre in pixels, `None` until the first detection or once the
    /// tracker has given up on a lost pupil
    pub position: Option<(f64, f64)>,
    /// Pupil radius in pixels when available this frame
    pub radius: Option<f64>,
    pub blinking: bool,
    /// Eye changed between open and blinking on this frame
    pub blink_changed: bool,
    /// Tracker reports a sustained fixation
    pub stable: bool,
    /// Mean recent pupil speed in px/s
    pub velocity: f64,
}

/// Signal pipeline for a single eye
#[derive(Debug, Clone)]
pub struct EyePipeline {
    config: PipelineConfig,
    x_filter: PupilFilter,
    y_filter: PupilFilter,
    tracker: PrecisionTracker,
    blink: BlinkStateMachine,
    seen_detection: bool,
}

impl EyePipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
            x_filter: PupilFilter::new(&config.filter),
            y_filter: PupilFilter::new(&config.filter),
            tracker: PrecisionTracker::new(config.tracker.clone()),
            blink: BlinkStateMachine::new(config.blink.clone()),
            seen_detection: false,
        }
    }

    /// Process one frame
    ///
    /// # Arguments
    /// * `frame` - Detector output for this eye, timestamps non-decreasing
    ///
    /// # Returns
    /// Position, blink and fixation state after this frame
    pub fn process(&mut self, frame: &EyeFrame) -> EyeOutput {
        // A non-finite circle is a failed detection for every component
        let frame = EyeFrame::new(frame.timestamp, frame.detection.filter(|c| c.is_finite()));
        let blink_changed = self.blink.process(frame.is_detected(), frame.timestamp);

        let filtered_x = self.x_filter.process_sample(&frame.x_sample());
        let filtered_y = self.y_filter.process_sample(&frame.y_sample());
        let tracked = self.tracker.update(frame.detection, frame.timestamp);

        if frame.is_detected() {
            self.seen_detection = true;
        }

        let (position, radius) = match self.config.mode {
            PipelineMode::Filtered => {
                let position = self.seen_detection.then_some((filtered_x, filtered_y));
                (position, frame.detection.map(|c| c.radius))
            }
            PipelineMode::Tracked => match tracked {
                Some(p) => (Some((p.x as f64, p.y as f64)), Some(p.radius as f64)),
                None => (None, None),
            },
        };

        EyeOutput {
            timestamp: frame.timestamp,
            position,
            radius,
            blinking: self.blink.is_blinking(),
            blink_changed,
            stable: self.tracker.is_stable(),
            velocity: self.tracker.velocity(),
        }
    }

    /// Apply a `key = value` setting and push the result to every component
    ///
    /// # Returns
    /// Whether the key was recognized
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        if !self.config.apply_setting(key, value)? {
            return Ok(false);
        }
        self.sync_components();
        Ok(true)
    }

    /// Replace the whole configuration, keeping accumulated history
    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
        self.sync_components();
    }

    fn sync_components(&mut self) {
        self.x_filter.apply_config(&self.config.filter);
        self.y_filter.apply_config(&self.config.filter);
        self.tracker.update_config(self.config.tracker.clone());
        self.blink.update_config(self.config.blink.clone());
        // Keep the stored copy in step with any normalization done downstream
        self.config.filter = self.x_filter.config();
        self.config.tracker = self.tracker.config().clone();
    }

    /// Reset every component to its initial state
    pub fn reset(&mut self) {
        self.x_filter.reset();
        self.y_filter.reset();
        self.tracker.reset();
        self.blink.reset();
        self.seen_detection = false;
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn mode(&self) -> PipelineMode {
        self.config.mode
    }

    pub fn x_filter(&self) -> &PupilFilter {
        &self.x_filter
    }

    pub fn y_filter(&self) -> &PupilFilter {
        &self.y_filter
    }

    pub fn tracker(&self) -> &PrecisionTracker {
        &self.tracker
    }

    pub fn blink(&self) -> &BlinkStateMachine {
        &self.blink
    }

    /// Blink intervals so far, including one still open at `current_time`
    pub fn blink_intervals(&self, current_time: Option<f64>) -> Vec<BlinkInterval> {
        self.blink.intervals(current_time)
    }
}

impl Default for EyePipeline {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

/// Left and right eye pipelines sharing one configuration
#[derive(Debug, Clone, Default)]
pub struct BinocularPipeline {
    pub left: EyePipeline,
    pub right: EyePipeline,
}

impl BinocularPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            left: EyePipeline::new(config),
            right: EyePipeline::new(config),
        }
    }

    /// Process one frame for each eye
    pub fn process(&mut self, left: &EyeFrame, right: &EyeFrame) -> (EyeOutput, EyeOutput) {
        (self.left.process(left), self.right.process(right))
    }

    /// Apply a setting to both eyes
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        let applied = self.left.apply_setting(key, value)?;
        self.right.apply_setting(key, value)?;
        Ok(applied)
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pupil_filter::MAX_WINDOW_SIZE;
    use crate::sample::PupilCircle;
    use crate::smoothing::FilterKind;
    use approx::assert_relative_eq;

    fn detected(t: f64, x: f64, y: f64) -> EyeFrame {
        EyeFrame::new(t, Some(PupilCircle::new(x, y, 20.0)))
    }

    fn missing(t: f64) -> EyeFrame {
        EyeFrame::new(t, None)
    }

    #[test]
    fn test_no_position_before_first_detection() {
        let mut pipeline = EyePipeline::default();
        let out = pipeline.process(&missing(0.0));

        assert_eq!(out.position, None);
        assert_eq!(out.radius, None);
        assert!(out.blinking);
        assert!(out.blink_changed);
    }

    #[test]
    fn test_filtered_mode_follows_filters() {
        let mut pipeline = EyePipeline::default();
        let out = pipeline.process(&detected(0.0, 100.0, 50.0));

        assert_eq!(out.position, Some((100.0, 50.0)));
        assert_eq!(out.radius, Some(20.0));
        assert!(!out.blinking);
        assert!(!out.blink_changed);
    }

    #[test]
    fn test_filtered_mode_interpolates_through_gap() {
        let mut pipeline = EyePipeline::default();
        pipeline.process(&detected(0.0, 100.0, 50.0));
        pipeline.process(&detected(0.1, 102.0, 50.0));
        let out = pipeline.process(&missing(0.2));

        // Trend of +2 per 0.1s, projected 0.1s past the last detection
        let (x, y) = out.position.unwrap();
        assert_relative_eq!(x, 104.0, epsilon = 1e-9);
        assert_relative_eq!(y, 50.0, epsilon = 1e-9);
        assert_eq!(out.radius, None);
        assert!(out.blinking);
    }

    #[test]
    fn test_tracked_mode_rejects_spike() {
        let mut config = PipelineConfig::default();
        config.mode = PipelineMode::Tracked;
        let mut pipeline = EyePipeline::new(&config);

        for i in 0..4 {
            pipeline.process(&detected(i as f64 * 0.01, 100.0, 100.0));
        }
        let out = pipeline.process(&detected(0.04, 180.0, 100.0));

        assert_eq!(out.position, Some((100.0, 100.0)));
        assert_eq!(out.radius, Some(20.0));
    }

    #[test]
    fn test_tracked_mode_loses_pupil() {
        let mut config = PipelineConfig::default();
        config.mode = PipelineMode::Tracked;
        config.tracker.max_lost_frames = 2;
        let mut pipeline = EyePipeline::new(&config);

        pipeline.process(&detected(0.0, 100.0, 100.0));
        assert!(pipeline.process(&missing(0.01)).position.is_some());
        assert!(pipeline.process(&missing(0.02)).position.is_some());
        assert!(pipeline.process(&missing(0.03)).position.is_none());
    }

    #[test]
    fn test_blink_reported_on_reopen() {
        let mut pipeline = EyePipeline::default();
        pipeline.process(&detected(0.0, 100.0, 100.0));
        pipeline.process(&missing(0.1));
        pipeline.process(&missing(0.2));
        let out = pipeline.process(&detected(0.3, 100.0, 100.0));

        assert!(out.blink_changed);
        assert!(!out.blinking);
        let intervals = pipeline.blink_intervals(None);
        assert_eq!(intervals.len(), 1);
        assert_relative_eq!(intervals[0].start, 0.1);
        assert_relative_eq!(intervals[0].end, 0.3);
    }

    #[test]
    fn test_stable_after_fixation() {
        let mut config = PipelineConfig::default();
        config.tracker.fixation_threshold = 3;
        let mut pipeline = EyePipeline::new(&config);

        let mut last = None;
        for i in 0..5 {
            last = Some(pipeline.process(&detected(i as f64 * 0.01, 100.0, 100.0)));
        }
        let out = last.unwrap();
        assert!(out.stable);
        assert_relative_eq!(out.velocity, 0.0);
    }

    #[test]
    fn test_apply_setting_reaches_components() {
        let mut pipeline = EyePipeline::default();

        assert!(pipeline.apply_setting("window_size", "4").unwrap());
        assert!(pipeline.apply_setting("filter_type", "median").unwrap());
        assert!(pipeline.apply_setting("outlier_threshold", "30").unwrap());
        assert!(pipeline.apply_setting("max_blink_duration", "1.5").unwrap());
        assert!(pipeline.apply_setting("mode", "tracked").unwrap());
        assert!(!pipeline.apply_setting("gain", "2").unwrap());

        assert_eq!(pipeline.x_filter().window_size(), 5);
        assert_eq!(pipeline.y_filter().filter_kind(), FilterKind::Median);
        assert_relative_eq!(pipeline.tracker().config().outlier_threshold, 30.0);
        assert_eq!(pipeline.blink().config().max_duration, Some(1.5));
        assert_eq!(pipeline.mode(), PipelineMode::Tracked);
        assert_eq!(pipeline.config().filter.window_size, 5);
    }

    #[test]
    fn test_invalid_setting_leaves_pipeline_unchanged() {
        let mut pipeline = EyePipeline::default();
        assert!(pipeline.apply_setting("window_size", "big").is_err());
        assert_eq!(pipeline.config(), &PipelineConfig::default());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut pipeline = EyePipeline::default();
        pipeline.process(&detected(0.0, 100.0, 100.0));
        pipeline.process(&missing(0.1));

        pipeline.reset();

        assert_eq!(pipeline.x_filter().history_len(), 0);
        assert!(pipeline.tracker().last_position().is_none());
        assert!(!pipeline.blink().is_blinking());
        assert!(pipeline.blink_intervals(Some(1.0)).is_empty());
        assert_eq!(pipeline.process(&missing(0.2)).position, None);
    }

    #[test]
    fn test_binocular_eyes_independent() {
        let mut pipeline = BinocularPipeline::default();
        let (left, right) = pipeline.process(&detected(0.0, 10.0, 10.0), &missing(0.0));

        assert!(!left.blinking);
        assert!(right.blinking);
        assert_eq!(right.position, None);

        assert!(pipeline.apply_setting("window_size", "9").unwrap());
        assert_eq!(pipeline.left.x_filter().window_size(), 9);
        assert_eq!(pipeline.right.x_filter().window_size(), 9);
    }

    #[test]
    fn test_output_serializes() {
        let out = EyeOutput {
            timestamp: 1.0,
            position: Some((1.5, 2.5)),
            radius: None,
            blinking: false,
            blink_changed: false,
            stable: true,
            velocity: 3.0,
        };
        let json = serde_json::to_string(&out).unwrap();
        let back: EyeOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn test_huge_window_setting_is_capped() {
        let mut pipeline = EyePipeline::default();
        assert!(pipeline.apply_setting("window_size", "1e30").unwrap());
        assert_eq!(pipeline.x_filter().window_size(), MAX_WINDOW_SIZE);
        assert_eq!(pipeline.config().filter.window_size, MAX_WINDOW_SIZE);

        let out = pipeline.process(&detected(0.0, 10.0, 10.0));
        assert_eq!(out.position, Some((10.0, 10.0)));
    }

    #[test]
    fn test_non_finite_detection_is_a_missed_frame() {
        let mut config = PipelineConfig::default();
        config.mode = PipelineMode::Tracked;
        let mut pipeline = EyePipeline::new(&config);

        for i in 0..5 {
            pipeline.process(&detected(i as f64 * 0.01, 100.0, 100.0));
        }
        let out = pipeline.process(&EyeFrame::new(
            0.05,
            Some(PupilCircle::new(f64::NAN, 100.0, 20.0)),
        ));

        assert!(out.blinking);
        assert!(out.blink_changed);
        assert_eq!(out.position, Some((100.0, 100.0)));
        assert_eq!(pipeline.tracker().lost_frames(), 1);

        let out = pipeline.process(&detected(0.06, 100.0, 100.0));
        assert!(out.velocity.is_finite());
        assert!(!out.blinking);
        assert_eq!(pipeline.x_filter().missing_frames(), 0);
    }
}
