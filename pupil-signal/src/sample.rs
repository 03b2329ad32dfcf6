//! Per-frame input and output types shared by the pipeline components.
//!
//! A camera-side pupil detector produces one [`EyeFrame`] per eye per frame. The
//! pupil filter consumes a single axis of it as a [`Sample`], the precision tracker
//! consumes the full [`PupilCircle`], and the blink state machine only looks at
//! whether a detection exists.

use serde::{Deserialize, Serialize};

/// One axis of a pupil detection for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic capture time in seconds
    pub timestamp: f64,
    /// Pixel coordinate on one axis (ignored when `detected` is false)
    pub value: f64,
    /// Whether the pupil was located in this frame
    pub detected: bool,
}

impl Sample {
    /// Create a detected sample
    pub fn detected(timestamp: f64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            detected: true,
        }
    }

    /// Create a sample for a frame where the pupil was not found
    pub fn missing(timestamp: f64) -> Self {
        Self {
            timestamp,
            value: 0.0,
            detected: false,
        }
    }
}

/// A detected pupil circle in sensor coordinates (pixels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PupilCircle {
    /// X center position in pixels
    pub x: f64,
    /// Y center position in pixels
    pub y: f64,
    /// Fitted pupil radius in pixels
    pub radius: f64,
}

impl PupilCircle {
    /// Create a new pupil circle
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }

    /// Euclidean distance between the centers of two circles (radius ignored)
    pub fn distance_to(&self, other: &PupilCircle) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Whether centre and radius are all finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.radius.is_finite()
    }

    /// Truncate to whole pixels (toward zero)
    pub fn to_pixels(&self) -> PixelCircle {
        PixelCircle {
            x: self.x as i32,
            y: self.y as i32,
            radius: self.radius as i32,
        }
    }
}

/// Integer pupil circle as reported by the precision tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCircle {
    pub x: i32,
    pub y: i32,
    pub radius: i32,
}

/// Everything the detector reports for one eye in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeFrame {
    /// Monotonic capture time in seconds
    pub timestamp: f64,
    /// Detected pupil, or `None` when the pupil was not found (blink, glare, ...)
    pub detection: Option<PupilCircle>,
}

impl EyeFrame {
    /// Create a new eye frame
    pub fn new(timestamp: f64, detection: Option<PupilCircle>) -> Self {
        Self {
            timestamp,
            detection,
        }
    }

    /// Whether the pupil was detected in this frame
    pub fn is_detected(&self) -> bool {
        self.detection.is_some()
    }

    /// Split out the horizontal axis as a filter sample
    pub fn x_sample(&self) -> Sample {
        match self.detection {
            Some(circle) => Sample::detected(self.timestamp, circle.x),
            None => Sample::missing(self.timestamp),
        }
    }

    /// Split out the vertical axis as a filter sample
    pub fn y_sample(&self) -> Sample {
        match self.detection {
            Some(circle) => Sample::detected(self.timestamp, circle.y),
            None => Sample::missing(self.timestamp),
        }
    }
}
