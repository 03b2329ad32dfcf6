//! Outlier-rejecting pupil position tracker with fixation detection.
//!
//! Built for velocity measurements: spurious single-frame jumps are discarded
//! using a median-distance test, while genuine fast movements (saccades,
//! nystagmus fast phases) pass through untouched. When the gaze holds still for
//! long enough, the output is stabilized on an exponentially weighted centroid.

use serde::{Deserialize, Serialize};

use crate::ring_buffer::HistoryRing;
use crate::sample::{PixelCircle, PupilCircle};
use crate::smoothing::median;

/// Tracker thresholds and history length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Number of recent positions and velocities kept (minimum 1)
    pub history_size: usize,
    /// Largest per-frame jump in pixels accepted without the median test
    pub outlier_threshold: f64,
    /// Consecutive frames without detection before all state is dropped
    pub max_lost_frames: usize,
    /// Consecutive still frames before the gaze counts as fixating
    pub fixation_threshold: usize,
    /// Largest per-frame movement in pixels that still counts as still
    pub fixation_distance: f64,
    /// Weight of the newest sample in the fixation centroid
    pub fixation_alpha: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_size: 5,
            outlier_threshold: 15.0,
            max_lost_frames: 5,
            fixation_threshold: 10,
            fixation_distance: 5.0,
            fixation_alpha: 0.1,
        }
    }
}

/// Largest number of recent positions and velocities kept
pub const MAX_HISTORY_SIZE: usize = 1024;

/// Clamp a requested history length to `1..=MAX_HISTORY_SIZE`
pub fn normalize_history_size(requested: usize) -> usize {
    requested.clamp(1, MAX_HISTORY_SIZE)
}

/// Minimum number of recent positions before the median outlier test is trusted
const MIN_POSITIONS_FOR_OUTLIER_TEST: usize = 3;

/// Precision tracker for a single pupil
#[derive(Debug, Clone)]
pub struct PrecisionTracker {
    config: TrackerConfig,
    positions: HistoryRing<PupilCircle>,
    velocities: HistoryRing<f64>,
    last_position: Option<PupilCircle>,
    last_timestamp: f64,
    lost_frames: usize,
    is_fixating: bool,
    fixation_count: usize,
    fixation_centroid: Option<PupilCircle>,
}

impl PrecisionTracker {
    /// Create a tracker; `history_size` is clamped to `1..=MAX_HISTORY_SIZE`
    pub fn new(mut config: TrackerConfig) -> Self {
        config.history_size = normalize_history_size(config.history_size);

        Self {
            positions: HistoryRing::new(config.history_size),
            velocities: HistoryRing::new(config.history_size),
            config,
            last_position: None,
            last_timestamp: 0.0,
            lost_frames: 0,
            is_fixating: false,
            fixation_count: 0,
            fixation_centroid: None,
        }
    }

    /// Feed one frame's detection
    ///
    /// # Arguments
    /// * `detection` - Detected circle, or `None` when the pupil was not found
    /// * `timestamp` - Capture time in seconds, non-decreasing across calls
    ///
    /// # Returns
    /// The tracked position truncated to whole pixels, or `None` if nothing is
    /// being tracked
    pub fn update(&mut self, detection: Option<PupilCircle>, timestamp: f64) -> Option<PixelCircle> {
        let Some(current) = detection else {
            return self.handle_lost_frame();
        };
        if !current.is_finite() {
            log::debug!("Non-finite pupil circle at t={timestamp}, treating as lost");
            return self.handle_lost_frame();
        }

        let Some(last) = self.last_position else {
            self.last_position = Some(current);
            self.last_timestamp = timestamp;
            self.positions.push(current);
            self.lost_frames = 0;
            return Some(current.to_pixels());
        };

        let distance = current.distance_to(&last);

        if distance > self.config.outlier_threshold && self.is_outlier(&current) {
            log::debug!(
                "Rejected outlier at ({:.1}, {:.1}), jump of {distance:.1}px",
                current.x,
                current.y
            );
            return Some(last.to_pixels());
        }

        let dt = timestamp - self.last_timestamp;
        if dt > 0.0 {
            self.velocities.push(distance / dt);
        }
        self.positions.push(current);

        // Velocity and distance always use the raw detection
        self.last_position = Some(current);
        self.last_timestamp = timestamp;

        if distance < self.config.fixation_distance {
            self.fixation_count += 1;

            let alpha = self.config.fixation_alpha;
            let centroid = match self.fixation_centroid {
                None => current,
                Some(c) => PupilCircle::new(
                    c.x * (1.0 - alpha) + current.x * alpha,
                    c.y * (1.0 - alpha) + current.y * alpha,
                    c.radius * (1.0 - alpha) + current.radius * alpha,
                ),
            };
            self.fixation_centroid = Some(centroid);

            if self.fixation_count >= self.config.fixation_threshold {
                if !self.is_fixating {
                    log::debug!("Fixation at ({:.1}, {:.1})", centroid.x, centroid.y);
                }
                self.is_fixating = true;
                let stabilized = PupilCircle::new(centroid.x, centroid.y, current.radius);
                return Some(stabilized.to_pixels());
            }
        } else {
            self.clear_fixation();
        }

        // Stabilized frames leave the lost counter running
        self.lost_frames = 0;
        Some(current.to_pixels())
    }

    /// No detection this frame: keep the last position until the lost limit is hit
    fn handle_lost_frame(&mut self) -> Option<PixelCircle> {
        self.lost_frames += 1;
        if self.lost_frames > self.config.max_lost_frames {
            if self.last_position.is_some() {
                log::debug!(
                    "Pupil lost for {} frames, resetting tracker",
                    self.lost_frames
                );
            }
            self.last_position = None;
            self.positions.clear();
            self.velocities.clear();
            self.clear_fixation();
        }

        self.last_position.map(|p| p.to_pixels())
    }

    /// Median test: far from the component-wise median of recent positions
    fn is_outlier(&self, current: &PupilCircle) -> bool {
        if self.positions.len() < MIN_POSITIONS_FOR_OUTLIER_TEST {
            return false;
        }
        match self.median_position() {
            Some(m) => current.distance_to(&m) > self.config.outlier_threshold,
            None => false,
        }
    }

    /// Component-wise median of the recent positions
    fn median_position(&self) -> Option<PupilCircle> {
        let xs: Vec<f64> = self.positions.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = self.positions.iter().map(|p| p.y).collect();
        let rs: Vec<f64> = self.positions.iter().map(|p| p.radius).collect();
        Some(PupilCircle::new(median(&xs)?, median(&ys)?, median(&rs)?))
    }

    fn clear_fixation(&mut self) {
        self.is_fixating = false;
        self.fixation_count = 0;
        self.fixation_centroid = None;
    }

    /// Mean of the recent instantaneous velocities in px/s (0.0 if none)
    pub fn velocity(&self) -> f64 {
        if self.velocities.is_empty() {
            return 0.0;
        }
        self.velocities.iter().sum::<f64>() / self.velocities.len() as f64
    }

    /// Whether the gaze is currently fixating
    pub fn is_stable(&self) -> bool {
        self.is_fixating
    }

    /// Apply new thresholds; a changed history size keeps the newest entries
    pub fn update_config(&mut self, mut config: TrackerConfig) {
        config.history_size = normalize_history_size(config.history_size);
        self.positions.resize(config.history_size);
        self.velocities.resize(config.history_size);
        self.config = config;
    }

    /// Drop all tracking state
    pub fn reset(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.last_position = None;
        self.last_timestamp = 0.0;
        self.lost_frames = 0;
        self.clear_fixation();
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Last accepted raw detection
    pub fn last_position(&self) -> Option<PupilCircle> {
        self.last_position
    }

    /// Recent accepted positions, oldest first
    pub fn recent_positions(&self) -> Vec<PupilCircle> {
        self.positions.to_vec()
    }

    /// Recent instantaneous velocities in px/s, oldest first
    pub fn recent_velocities(&self) -> Vec<f64> {
        self.velocities.to_vec()
    }

    pub fn lost_frames(&self) -> usize {
        self.lost_frames
    }

    pub fn fixation_count(&self) -> usize {
        self.fixation_count
    }

    pub fn fixation_centroid(&self) -> Option<PupilCircle> {
        self.fixation_centroid
    }
}

impl Default for PrecisionTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
