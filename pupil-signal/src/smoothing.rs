//! Smoothing kernels for pupil coordinate histories.
//!
//! Each kernel is a pure function over a time-ordered slice of processed values
//! and produces the smoothed value for the newest sample only. Kernels return
//! `None` when the value cannot be computed (empty input, singular fit,
//! non-finite result); the caller decides on the fallback.
//!
//! # Kernels
//!
//! ## Polynomial regression (Savitzky–Golay edge fit)
//! Least-squares polynomial of order `min(3, window - 1)` fitted over the newest
//! `window` samples and evaluated at the newest one. Keeps the peaks and slopes of
//! nystagmus beats intact.
//!
//! ## Median
//! Median of the newest `window` samples. Robust to single-sample spikes.
//!
//! ## Moving average
//! Arithmetic mean of the newest `window` samples. Most lag, flattens fast
//! transitions the most.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Highest polynomial order used by the regression kernel
pub const MAX_POLY_ORDER: usize = 3;

/// Singular value cutoff for the least-squares solve
const SVD_EPSILON: f64 = 1e-10;

/// Smoothing kernel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterKind {
    /// Local polynomial regression (Savitzky–Golay)
    #[default]
    Polynomial,
    /// Sliding median
    Median,
    /// Arithmetic mean
    MovingAverage,
    /// No smoothing, newest value passes through
    Passthrough,
}

impl FilterKind {
    /// Configuration name of this kernel
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Polynomial => "savgol",
            FilterKind::Median => "median",
            FilterKind::MovingAverage => "moving_avg",
            FilterKind::Passthrough => "passthrough",
        }
    }

    /// Parse a configuration name.
    ///
    /// Unrecognized names select [`FilterKind::Passthrough`] so the pipeline keeps
    /// producing output; a warning is logged.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "savgol" | "savitzky_golay" | "polynomial" => FilterKind::Polynomial,
            "median" => FilterKind::Median,
            "moving_avg" | "moving_average" | "mean" => FilterKind::MovingAverage,
            "passthrough" | "none" => FilterKind::Passthrough,
            other => {
                log::warn!("Unrecognized filter type '{other}', passing values through unfiltered");
                FilterKind::Passthrough
            }
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FilterKind::parse(s))
    }
}

impl From<String> for FilterKind {
    fn from(name: String) -> Self {
        FilterKind::parse(&name)
    }
}

impl From<FilterKind> for String {
    fn from(kind: FilterKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Smoothed value of the newest sample in `values` (oldest first).
///
/// Only the newest `window` entries take part. Returns `None` if the kernel
/// cannot produce a finite value.
pub fn smooth_newest(kind: FilterKind, values: &[f64], window: usize) -> Option<f64> {
    if values.is_empty() || window == 0 {
        return None;
    }
    let start = values.len().saturating_sub(window);
    let windowed = &values[start..];

    let result = match kind {
        FilterKind::Polynomial => {
            let order = MAX_POLY_ORDER.min(window - 1);
            polynomial_newest(windowed, order)
        }
        FilterKind::Median => median(windowed),
        FilterKind::MovingAverage => mean(windowed),
        FilterKind::Passthrough => windowed.last().copied(),
    };

    result.filter(|v| v.is_finite())
}

/// Fit a polynomial of the given order to `values` and evaluate it at the newest index.
///
/// Abscissae are sample indices centered on the window, which keeps the
/// Vandermonde matrix well conditioned. Order is reduced to `len - 1` when there
/// are too few points for the requested fit.
pub fn polynomial_newest(values: &[f64], order: usize) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let order = order.min(n - 1);
    let cols = order + 1;
    let center = (n - 1) as f64 / 2.0;

    let mut a_data = Vec::with_capacity(n * cols);
    for i in 0..n {
        let x = i as f64 - center;
        let mut power = 1.0;
        for _ in 0..cols {
            a_data.push(power);
            power *= x;
        }
    }

    let a_matrix = DMatrix::from_row_slice(n, cols, &a_data);
    let b_vec = DVector::from_column_slice(values);

    let svd = a_matrix.svd(true, true);
    let coeffs = svd.solve(&b_vec, SVD_EPSILON).ok()?;

    // Horner evaluation at the newest sample
    let x_newest = (n - 1) as f64 - center;
    let value = coeffs
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * x_newest + c);

    value.is_finite().then_some(value)
}

/// Median of `values`; even lengths average the two middle entries.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let len = sorted.len();
    if len % 2 == 0 {
        Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0)
    } else {
        Some(sorted[len / 2])
    }
}

/// Arithmetic mean of `values`
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
