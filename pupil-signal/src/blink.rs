//! Per-eye blink detection from the raw pupil detection flag.
//!
//! Each eye runs an independent two-state machine: `Open` until a frame without
//! a detection arrives, then `Blinking` until the pupil is found again. Closing
//! a blink commits a `(start, end)` interval to the eye's history. The blink in
//! progress is never committed before it closes; callers that want to draw it
//! ask for it with the current time.

use serde::{Deserialize, Serialize};

/// Optional duration bounds applied when a blink closes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Shortest blink in seconds that is recorded
    pub min_duration: Option<f64>,
    /// Longest blink in seconds that is recorded
    pub max_duration: Option<f64>,
}

impl BlinkConfig {
    fn accepts(&self, duration: f64) -> bool {
        if duration <= 0.0 {
            return false;
        }
        if self.min_duration.is_some_and(|min| duration < min) {
            return false;
        }
        if self.max_duration.is_some_and(|max| duration > max) {
            return false;
        }
        true
    }
}

/// A blink from the frame the pupil disappeared to the frame it came back
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlinkInterval {
    /// Time of the first frame without detection (seconds)
    pub start: f64,
    /// Time of the first frame with detection again (seconds)
    pub end: f64,
}

impl BlinkInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the interval intersects `[view_start, view_end]`
    pub fn overlaps(&self, view_start: f64, view_end: f64) -> bool {
        self.end >= view_start && self.start <= view_end
    }
}

/// Eye state for blink detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EyeState {
    Open,
    Blinking { start: f64 },
}

/// Summary of the blinks recorded for one eye
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlinkStatistics {
    pub total_blinks: usize,
    /// Span between the first and last processed frame
    pub observed_seconds: f64,
    pub blinks_per_minute: f64,
    pub mean_duration: f64,
}

/// Blink state machine for a single eye
#[derive(Debug, Clone)]
pub struct BlinkStateMachine {
    config: BlinkConfig,
    state: EyeState,
    closed_intervals: Vec<BlinkInterval>,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
}

impl BlinkStateMachine {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            config,
            state: EyeState::Open,
            closed_intervals: Vec::new(),
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    /// Advance the state machine by one frame
    ///
    /// # Arguments
    /// * `detected` - Whether the pupil was found in this frame
    /// * `current_time` - Capture time in seconds
    ///
    /// # Returns
    /// `true` if the eye changed between open and blinking
    pub fn process(&mut self, detected: bool, current_time: f64) -> bool {
        self.first_timestamp.get_or_insert(current_time);
        self.last_timestamp = Some(current_time);

        match (self.state, detected) {
            (EyeState::Open, false) => {
                log::debug!("Blink started at {current_time:.3}");
                self.state = EyeState::Blinking {
                    start: current_time,
                };
                true
            }
            (EyeState::Blinking { start }, true) => {
                self.state = EyeState::Open;
                let interval = BlinkInterval::new(start, current_time);
                if self.config.accepts(interval.duration()) {
                    log::debug!("Blink ended at {current_time:.3} after {:.3}s", interval.duration());
                    self.closed_intervals.push(interval);
                } else {
                    log::debug!(
                        "Discarded blink of {:.3}s starting at {start:.3}",
                        interval.duration()
                    );
                }
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> EyeState {
        self.state
    }

    pub fn is_blinking(&self) -> bool {
        matches!(self.state, EyeState::Blinking { .. })
    }

    /// Start time of the blink in progress
    pub fn blink_start_time(&self) -> Option<f64> {
        match self.state {
            EyeState::Blinking { start } => Some(start),
            EyeState::Open => None,
        }
    }

    /// Committed blink history, oldest first
    pub fn closed_intervals(&self) -> &[BlinkInterval] {
        &self.closed_intervals
    }

    /// The blink in progress as an open-ended interval ending at `current_time`
    pub fn in_progress(&self, current_time: f64) -> Option<BlinkInterval> {
        self.blink_start_time()
            .map(|start| BlinkInterval::new(start, current_time.max(start)))
    }

    /// All committed blinks, plus the one in progress when `current_time` is given
    pub fn intervals(&self, current_time: Option<f64>) -> Vec<BlinkInterval> {
        let mut intervals = self.closed_intervals.clone();
        if let Some(open) = current_time.and_then(|t| self.in_progress(t)) {
            intervals.push(open);
        }
        intervals
    }

    /// Committed blinks overlapping the view window, at most the `max_regions` newest
    pub fn visible_intervals(
        &self,
        view_start: f64,
        view_end: f64,
        max_regions: usize,
    ) -> Vec<BlinkInterval> {
        let visible: Vec<BlinkInterval> = self
            .closed_intervals
            .iter()
            .filter(|i| i.overlaps(view_start, view_end))
            .copied()
            .collect();

        let skip = visible.len().saturating_sub(max_regions);
        visible[skip..].to_vec()
    }

    pub fn statistics(&self) -> BlinkStatistics {
        let total_blinks = self.closed_intervals.len();
        let observed_seconds = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        };
        let blinks_per_minute = if observed_seconds > 0.0 {
            total_blinks as f64 / (observed_seconds / 60.0)
        } else {
            0.0
        };
        let mean_duration = if total_blinks > 0 {
            self.closed_intervals.iter().map(|i| i.duration()).sum::<f64>() / total_blinks as f64
        } else {
            0.0
        };

        BlinkStatistics {
            total_blinks,
            observed_seconds,
            blinks_per_minute,
            mean_duration,
        }
    }

    /// Change the duration bounds for blinks closing from now on
    pub fn update_config(&mut self, config: BlinkConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &BlinkConfig {
        &self.config
    }

    /// Back to `Open` with an empty history
    pub fn reset(&mut self) {
        self.state = EyeState::Open;
        self.closed_intervals.clear();
        self.first_timestamp = None;
        self.last_timestamp = None;
    }
}

impl Default for BlinkStateMachine {
    fn default() -> Self {
        Self::new(BlinkConfig::default())
    }
}

/// Blink data for one eye, ready for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeBlinkReport {
    pub intervals: Vec<BlinkInterval>,
    pub in_progress: Option<BlinkInterval>,
    pub statistics: BlinkStatistics,
}

impl EyeBlinkReport {
    fn from_machine(machine: &BlinkStateMachine, current_time: Option<f64>) -> Self {
        Self {
            intervals: machine.closed_intervals().to_vec(),
            in_progress: current_time.and_then(|t| machine.in_progress(t)),
            statistics: machine.statistics(),
        }
    }
}

/// Blink data for both eyes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlinkReport {
    pub left: EyeBlinkReport,
    pub right: EyeBlinkReport,
    pub configuration: BlinkConfig,
}

/// Left and right blink state machines fed from the same frames
///
/// The eyes are never coupled; this only saves callers from routing the flags.
#[derive(Debug, Clone, Default)]
pub struct BinocularBlinkDetector {
    pub left: BlinkStateMachine,
    pub right: BlinkStateMachine,
}

impl BinocularBlinkDetector {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            left: BlinkStateMachine::new(config.clone()),
            right: BlinkStateMachine::new(config),
        }
    }

    /// Feed one frame for both eyes; returns the per-eye state change flags
    pub fn process(&mut self, left_detected: bool, right_detected: bool, timestamp: f64) -> (bool, bool) {
        (
            self.left.process(left_detected, timestamp),
            self.right.process(right_detected, timestamp),
        )
    }

    /// Visible committed blinks as `(left, right)`
    pub fn visible_intervals(
        &self,
        view_start: f64,
        view_end: f64,
        max_regions: usize,
    ) -> (Vec<BlinkInterval>, Vec<BlinkInterval>) {
        (
            self.left.visible_intervals(view_start, view_end, max_regions),
            self.right.visible_intervals(view_start, view_end, max_regions),
        )
    }

    /// All blinks as `(left, right)`, including blinks in progress when `current_time` is given
    pub fn intervals(&self, current_time: Option<f64>) -> (Vec<BlinkInterval>, Vec<BlinkInterval>) {
        (
            self.left.intervals(current_time),
            self.right.intervals(current_time),
        )
    }

    pub fn report(&self, current_time: Option<f64>) -> BlinkReport {
        BlinkReport {
            left: EyeBlinkReport::from_machine(&self.left, current_time),
            right: EyeBlinkReport::from_machine(&self.right, current_time),
            configuration: self.left.config().clone(),
        }
    }

    pub fn update_config(&mut self, config: BlinkConfig) {
        self.left.update_config(config.clone());
        self.right.update_config(config);
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}
