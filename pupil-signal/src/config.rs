//! Pipeline configuration and the key/value settings surface.
//!
//! Settings arrive from the host application as plain `key = value` strings.
//! Recognized keys are parsed and normalized (odd window, non-negative counts
//! and distances); unknown keys are ignored. Only values that cannot be parsed
//! at all are reported as errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::blink::BlinkConfig;
use crate::pupil_filter::{normalize_window_size, requested_window, FilterConfig};
use crate::smoothing::FilterKind;
use crate::tracker::{normalize_history_size, TrackerConfig};

/// Errors from parsing, loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidValue { key: String, value: String },
}

/// Which path pupil positions take through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Per-axis gap interpolation and smoothing
    #[default]
    Filtered,
    /// Outlier-rejecting precision tracker
    Tracked,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineMode::Filtered => write!(f, "filtered"),
            PipelineMode::Tracked => write!(f, "tracked"),
        }
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filtered" | "filter" => Ok(PipelineMode::Filtered),
            "tracked" | "tracker" => Ok(PipelineMode::Tracked),
            other => Err(format!("Unknown pipeline mode: {other}")),
        }
    }
}

/// Complete configuration for one eye's pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    pub filter: FilterConfig,
    pub tracker: TrackerConfig,
    pub blink: BlinkConfig,
}

impl PipelineConfig {
    /// Apply a single `key = value` setting
    ///
    /// # Returns
    /// * `Ok(true)` - The key was recognized and applied
    /// * `Ok(false)` - Unknown key, nothing changed
    /// * `Err(ConfigError::InvalidValue)` - Recognized key with an unparsable value
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        let key = key.trim();
        let value = value.trim();

        match key {
            "window_size" => {
                self.filter.window_size = normalize_window_size(parse_int(key, value)?);
            }
            "filter_type" => self.filter.filter_kind = FilterKind::parse(value),
            "max_interpolation_gap" => {
                self.filter.max_interpolation_gap = parse_count(key, value)?;
            }
            "outlier_threshold" => self.tracker.outlier_threshold = parse_distance(key, value)?,
            "fixation_threshold" => self.tracker.fixation_threshold = parse_count(key, value)?,
            "fixation_distance" => self.tracker.fixation_distance = parse_distance(key, value)?,
            "fixation_alpha" => {
                self.tracker.fixation_alpha = parse_float(key, value)?.clamp(0.0, 1.0);
            }
            "max_lost_frames" => self.tracker.max_lost_frames = parse_count(key, value)?,
            "history_size" => {
                self.tracker.history_size = normalize_history_size(parse_count(key, value)?);
            }
            "min_blink_duration" => self.blink.min_duration = parse_optional_seconds(key, value)?,
            "max_blink_duration" => self.blink.max_duration = parse_optional_seconds(key, value)?,
            "mode" => {
                self.mode = value.parse().map_err(|_| invalid(key, value))?;
            }
            _ => {
                log::debug!("Ignoring unknown setting '{key}'");
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Apply several settings in order, stopping at the first invalid value
    ///
    /// # Returns
    /// Number of recognized settings
    pub fn apply_settings<'a, I>(&mut self, settings: I) -> Result<usize, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut applied = 0;
        for (key, value) in settings {
            if self.apply_setting(key, value)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file; missing fields take their defaults
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let mut config: PipelineConfig = serde_json::from_str(&json)?;
        config.filter.window_size = normalize_window_size(requested_window(config.filter.window_size));
        config.tracker.history_size = normalize_history_size(config.tracker.history_size);
        Ok(config)
    }
}

/// Parse a `key=value` pair as given on a command line
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Setting must be in format 'key=value': {s}"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, ConfigError> {
    if let Ok(v) = value.parse::<i64>() {
        return Ok(v);
    }
    // Accept integral floats such as "7.0"
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        _ => Err(invalid(key, value)),
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    Ok(parse_int(key, value)?.max(0) as usize)
}

fn parse_float(key: &str, value: &str) -> Result<f64, ConfigError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(key, value)),
    }
}

fn parse_distance(key: &str, value: &str) -> Result<f64, ConfigError> {
    Ok(parse_float(key, value)?.max(0.0))
}

fn parse_optional_seconds(key: &str, value: &str) -> Result<Option<f64>, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        _ => Ok(Some(parse_distance(key, value)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pupil_filter::MAX_WINDOW_SIZE;
    use crate::tracker::MAX_HISTORY_SIZE;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn test_apply_recognized_settings() {
        let mut config = PipelineConfig::default();
        let applied = config
            .apply_settings([
                ("window_size", "4"),
                ("filter_type", "median"),
                ("max_interpolation_gap", "8"),
                ("outlier_threshold", "20.5"),
                ("fixation_threshold", "12"),
                ("fixation_distance", "3"),
                ("max_lost_frames", "7"),
                ("history_size", "9"),
                ("mode", "tracked"),
            ])
            .unwrap();

        assert_eq!(applied, 9);
        assert_eq!(config.filter.window_size, 5);
        assert_eq!(config.filter.filter_kind, FilterKind::Median);
        assert_eq!(config.filter.max_interpolation_gap, 8);
        assert_relative_eq!(config.tracker.outlier_threshold, 20.5);
        assert_eq!(config.tracker.fixation_threshold, 12);
        assert_relative_eq!(config.tracker.fixation_distance, 3.0);
        assert_eq!(config.tracker.max_lost_frames, 7);
        assert_eq!(config.tracker.history_size, 9);
        assert_eq!(config.mode, PipelineMode::Tracked);
    }

    #[test]
    fn test_unknown_key_ignored() {
        let mut config = PipelineConfig::default();
        assert!(!config.apply_setting("exposure_ms", "12").unwrap());
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_out_of_range_values_normalized() {
        let mut config = PipelineConfig::default();
        config.apply_setting("window_size", "-4").unwrap();
        config.apply_setting("history_size", "0").unwrap();
        config.apply_setting("max_lost_frames", "-2").unwrap();
        config.apply_setting("fixation_alpha", "1.5").unwrap();
        config.apply_setting("outlier_threshold", "-1").unwrap();

        assert_eq!(config.filter.window_size, 1);
        assert_eq!(config.tracker.history_size, 1);
        assert_eq!(config.tracker.max_lost_frames, 0);
        assert_relative_eq!(config.tracker.fixation_alpha, 1.0);
        assert_relative_eq!(config.tracker.outlier_threshold, 0.0);
    }

    #[test]
    fn test_unparsable_value_rejected() {
        let mut config = PipelineConfig::default();
        let err = config.apply_setting("window_size", "wide").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "window_size"));
        assert!(config.apply_setting("fixation_distance", "NaN").is_err());
        assert!(config.apply_setting("mode", "sideways").is_err());
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_unknown_filter_type_is_passthrough() {
        let mut config = PipelineConfig::default();
        assert!(config.apply_setting("filter_type", "kalman").unwrap());
        assert_eq!(config.filter.filter_kind, FilterKind::Passthrough);
    }

    #[test]
    fn test_blink_duration_settings() {
        let mut config = PipelineConfig::default();
        config.apply_setting("min_blink_duration", "0.05").unwrap();
        config.apply_setting("max_blink_duration", "2").unwrap();
        assert_eq!(config.blink.min_duration, Some(0.05));
        assert_eq!(config.blink.max_duration, Some(2.0));

        config.apply_setting("max_blink_duration", "none").unwrap();
        assert_eq!(config.blink.max_duration, None);
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("window_size = 9").unwrap(),
            ("window_size".to_string(), "9".to_string())
        );
        assert!(parse_key_value("window_size").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.apply_setting("filter_type", "moving_avg").unwrap();
        config.apply_setting("fixation_threshold", "4").unwrap();
        config.save_to_file(&path).unwrap();

        let loaded = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_partial_file_normalizes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.json");
        std::fs::write(&path, r#"{"filter": {"window_size": 10}, "mode": "tracked"}"#).unwrap();

        let loaded = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.filter.window_size, 11);
        assert_eq!(loaded.filter.filter_kind, FilterKind::Polynomial);
        assert_eq!(loaded.mode, PipelineMode::Tracked);
        assert_eq!(loaded.tracker, TrackerConfig::default());
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            PipelineConfig::load_from_file(&path),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            PipelineConfig::load_from_file(&temp_dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_huge_sizes_are_capped() {
        let mut config = PipelineConfig::default();
        assert!(config.apply_setting("window_size", "1e30").unwrap());
        assert!(config.apply_setting("history_size", "1e30").unwrap());

        assert_eq!(config.filter.window_size, MAX_WINDOW_SIZE);
        assert_eq!(config.tracker.history_size, MAX_HISTORY_SIZE);
    }

    #[test]
    fn test_load_caps_huge_sizes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("huge.json");
        std::fs::write(
            &path,
            r#"{"filter": {"window_size": 18446744073709551615}, "tracker": {"history_size": 4000000000}}"#,
        )
        .unwrap();

        let loaded = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.filter.window_size, MAX_WINDOW_SIZE);
        assert_eq!(loaded.tracker.history_size, MAX_HISTORY_SIZE);
    }
}
