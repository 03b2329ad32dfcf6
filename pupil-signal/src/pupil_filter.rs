//! Gap interpolation and morphology-preserving smoothing for one pupil axis.
//!
//! A [`PupilFilter`] is fed one sample per camera frame. Frames where the pupil
//! was not found are filled in by projecting the recent trend forward, up to
//! `max_interpolation_gap` consecutive frames; beyond that the output freezes at
//! the last detected value. Every processed value then goes through the
//! configured smoothing kernel over a sliding window and only the newest
//! smoothed value is returned.
//!
//! Processing never fails: kernel failures fall back to the unsmoothed value and
//! are logged.

use serde::{Deserialize, Serialize};

use crate::ring_buffer::HistoryRing;
use crate::sample::Sample;
use crate::smoothing::{smooth_newest, FilterKind};

/// Default smoothing window in samples
pub const DEFAULT_WINDOW_SIZE: usize = 7;

/// Default number of consecutive missing frames that are interpolated
pub const DEFAULT_MAX_INTERPOLATION_GAP: usize = 5;

/// Largest smoothing window in samples
pub const MAX_WINDOW_SIZE: usize = 255;

/// Normalize a requested window size to an odd value in `1..=MAX_WINDOW_SIZE`.
///
/// Even sizes are incremented by one, anything below 1 becomes 1 and anything
/// above the maximum is capped.
pub fn normalize_window_size(requested: i64) -> usize {
    if requested < 1 {
        return 1;
    }
    let size = requested.min(MAX_WINDOW_SIZE as i64) as usize;
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

/// Window size from a stored configuration, saturating instead of wrapping
pub(crate) fn requested_window(window_size: usize) -> i64 {
    i64::try_from(window_size).unwrap_or(i64::MAX)
}

/// Pupil filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Smoothing window in samples (normalized to odd, >= 1)
    pub window_size: usize,
    /// Smoothing kernel
    #[serde(rename = "filter_type")]
    pub filter_kind: FilterKind,
    /// Maximum number of consecutive missing frames filled by trend projection
    pub max_interpolation_gap: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            filter_kind: FilterKind::default(),
            max_interpolation_gap: DEFAULT_MAX_INTERPOLATION_GAP,
        }
    }
}

/// Snapshot of a filter's configuration and buffer state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStatus {
    pub window_size: usize,
    pub filter_type: FilterKind,
    pub max_interpolation_gap: usize,
    /// Number of values currently held in the history
    pub buffer_size: usize,
    /// Consecutive missing frames since the last detection
    pub missing_frames: usize,
}

/// Gap interpolator + smoother for a single pupil coordinate axis
///
/// Keeps the newest `2 * window_size` processed values and their timestamps.
/// Not thread-safe by itself; each axis of each eye gets its own instance.
#[derive(Debug, Clone)]
pub struct PupilFilter {
    window_size: usize,
    filter_kind: FilterKind,
    max_interpolation_gap: usize,
    /// Processed (pre-smoothing) values, oldest first
    values: HistoryRing<f64>,
    /// Capture times parallel to `values`
    timestamps: HistoryRing<f64>,
    last_valid_value: f64,
    last_valid_timestamp: f64,
    missing_frames: usize,
    /// Reused window copy handed to the kernels
    scratch: Vec<f64>,
}

impl PupilFilter {
    /// Create a filter from a configuration
    ///
    /// The window size is normalized to an odd value of at least 1.
    pub fn new(config: &FilterConfig) -> Self {
        let window_size = normalize_window_size(requested_window(config.window_size));
        Self {
            window_size,
            filter_kind: config.filter_kind,
            max_interpolation_gap: config.max_interpolation_gap,
            values: HistoryRing::new(window_size * 2),
            timestamps: HistoryRing::new(window_size * 2),
            last_valid_value: 0.0,
            last_valid_timestamp: 0.0,
            missing_frames: 0,
            scratch: Vec::with_capacity(window_size),
        }
    }

    /// Create a filter with an explicit window and kernel, default gap limit
    pub fn with_kind(window_size: i64, filter_kind: FilterKind) -> Self {
        let mut filter = Self::new(&FilterConfig::default());
        filter.update_config(Some(window_size), Some(filter_kind), None);
        filter
    }

    /// Process one frame for this axis
    ///
    /// # Arguments
    /// * `timestamp` - Capture time in seconds, non-decreasing across calls
    /// * `raw_value` - Detected coordinate (ignored when `detected` is false)
    /// * `detected` - Whether the pupil was found in this frame
    ///
    /// # Returns
    /// The smoothed value for this frame, or the processed value itself while
    /// fewer than `window_size` values have been seen
    pub fn process(&mut self, timestamp: f64, raw_value: f64, detected: bool) -> f64 {
        let detected = if detected && !raw_value.is_finite() {
            log::debug!("Non-finite pupil coordinate {raw_value} at t={timestamp}, treating as missing");
            false
        } else {
            detected
        };

        let processed = if detected {
            self.missing_frames = 0;
            self.last_valid_value = raw_value;
            self.last_valid_timestamp = timestamp;
            raw_value
        } else {
            self.missing_frames += 1;
            self.interpolate_missing(timestamp)
        };

        self.values.push(processed);
        self.timestamps.push(timestamp);

        if self.values.len() < self.window_size {
            return processed;
        }
        self.apply_filter(processed)
    }

    /// Process a [`Sample`]
    pub fn process_sample(&mut self, sample: &Sample) -> f64 {
        self.process(sample.timestamp, sample.value, sample.detected)
    }

    /// Estimate a value for a frame without detection from the recent trend
    fn interpolate_missing(&self, timestamp: f64) -> f64 {
        if self.missing_frames > self.max_interpolation_gap {
            if self.missing_frames == self.max_interpolation_gap + 1 {
                log::debug!(
                    "Gap exceeded {} frames, holding last valid value {:.2}",
                    self.max_interpolation_gap,
                    self.last_valid_value
                );
            }
            return self.last_valid_value;
        }

        let (Some(newest), Some(previous)) = (self.values.from_newest(0), self.values.from_newest(1))
        else {
            return self.last_valid_value;
        };
        let (Some(t_newest), Some(t_previous)) =
            (self.timestamps.from_newest(0), self.timestamps.from_newest(1))
        else {
            return self.last_valid_value;
        };

        let dt = t_newest - t_previous;
        let dx = newest - previous;
        if dt > 0.0 {
            let elapsed = timestamp - self.last_valid_timestamp;
            let max_change = dx.abs() * 2.0;
            if !max_change.is_finite() {
                return self.last_valid_value;
            }
            let projected = self.last_valid_value
                + ((dx / dt) * elapsed).clamp(-max_change, max_change);
            if projected.is_finite() {
                return projected;
            }
        }

        self.last_valid_value
    }

    /// Run the smoothing kernel over the current window
    fn apply_filter(&mut self, newest: f64) -> f64 {
        self.values
            .copy_newest_into(self.window_size, &mut self.scratch);

        match smooth_newest(self.filter_kind, &self.scratch, self.window_size) {
            Some(value) => value,
            None => {
                log::warn!(
                    "Filter {} failed over {} samples, returning unfiltered value",
                    self.filter_kind,
                    self.scratch.len()
                );
                newest
            }
        }
    }

    /// Update configuration; `None` leaves a setting unchanged
    ///
    /// A new window size is normalized and both histories are resized keeping the
    /// newest values. Kernel and gap changes apply from the next `process` call.
    pub fn update_config(
        &mut self,
        window_size: Option<i64>,
        filter_kind: Option<FilterKind>,
        max_interpolation_gap: Option<usize>,
    ) {
        if let Some(requested) = window_size {
            self.window_size = normalize_window_size(requested);
            self.values.resize(self.window_size * 2);
            self.timestamps.resize(self.window_size * 2);
        }

        if let Some(kind) = filter_kind {
            self.filter_kind = kind;
        }

        if let Some(gap) = max_interpolation_gap {
            self.max_interpolation_gap = gap;
        }
    }

    /// Apply every setting from a configuration
    pub fn apply_config(&mut self, config: &FilterConfig) {
        self.update_config(
            Some(requested_window(config.window_size)),
            Some(config.filter_kind),
            Some(config.max_interpolation_gap),
        );
    }

    /// Clear all history and interpolation state
    pub fn reset(&mut self) {
        self.values.clear();
        self.timestamps.clear();
        self.last_valid_value = 0.0;
        self.last_valid_timestamp = 0.0;
        self.missing_frames = 0;
    }

    /// Effective configuration
    pub fn config(&self) -> FilterConfig {
        FilterConfig {
            window_size: self.window_size,
            filter_kind: self.filter_kind,
            max_interpolation_gap: self.max_interpolation_gap,
        }
    }

    /// Current configuration and buffer state
    pub fn status(&self) -> FilterStatus {
        FilterStatus {
            window_size: self.window_size,
            filter_type: self.filter_kind,
            max_interpolation_gap: self.max_interpolation_gap,
            buffer_size: self.values.len(),
            missing_frames: self.missing_frames,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn filter_kind(&self) -> FilterKind {
        self.filter_kind
    }

    /// Number of processed values held
    pub fn history_len(&self) -> usize {
        self.values.len()
    }

    /// Number of timestamps held (always equal to `history_len`)
    pub fn timestamp_history_len(&self) -> usize {
        self.timestamps.len()
    }

    /// Processed values, oldest first
    pub fn history(&self) -> Vec<f64> {
        self.values.to_vec()
    }

    /// Most recent detected value (0.0 before the first detection)
    pub fn last_valid_value(&self) -> f64 {
        self.last_valid_value
    }

    /// Consecutive missing frames since the last detection
    pub fn missing_frames(&self) -> usize {
        self.missing_frames
    }
}

impl Default for PupilFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}
