//! Synthetic nystagmus recordings.
//!
//! Jerk nystagmus is modelled as a horizontal sawtooth: a linear slow-phase
//! drift followed by a short fast-phase reset, repeated at the beat frequency.
//! Gaussian pixel noise, periodic blinks (frames with no detection) and rare
//! single-frame detector spikes are layered on top. Generation is fully
//! determined by the seed.

use pupil_signal::{EyeFrame, PupilCircle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, NormalError};

/// Fraction of each beat spent in the fast-phase reset
pub const FAST_PHASE_FRACTION: f64 = 0.1;

/// Parameters of a synthetic recording
#[derive(Debug, Clone, PartialEq)]
pub struct NystagmusConfig {
    /// Camera frame rate in Hz
    pub frame_rate: f64,
    /// Recording length in seconds
    pub duration: f64,
    /// Peak-to-peak horizontal excursion of one beat in pixels
    pub amplitude: f64,
    /// Beats per second
    pub beat_hz: f64,
    /// Resting pupil centre in pixels
    pub center: (f64, f64),
    /// Pupil radius in pixels
    pub radius: f64,
    /// Standard deviation of detector noise in pixels
    pub noise_std: f64,
    /// Time between blink onsets in seconds; 0 disables blinks
    pub blink_period: f64,
    /// Length of each blink in seconds
    pub blink_duration: f64,
    /// Per-frame probability of a detector spike
    pub spike_probability: f64,
    /// Horizontal size of a spike in pixels
    pub spike_magnitude: f64,
}

impl Default for NystagmusConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            duration: 10.0,
            amplitude: 20.0,
            beat_hz: 2.0,
            center: (320.0, 240.0),
            radius: 25.0,
            noise_std: 0.5,
            blink_period: 4.0,
            blink_duration: 0.15,
            spike_probability: 0.01,
            spike_magnitude: 40.0,
        }
    }
}

impl NystagmusConfig {
    /// Number of frames in the recording
    pub fn frame_count(&self) -> usize {
        if self.frame_rate <= 0.0 || self.duration <= 0.0 {
            return 0;
        }
        (self.duration * self.frame_rate).round() as usize
    }

    /// Noise-free horizontal offset from the centre at time `t`
    pub fn sawtooth_offset(&self, t: f64) -> f64 {
        let phase = (t * self.beat_hz).rem_euclid(1.0);
        let slow = 1.0 - FAST_PHASE_FRACTION;
        let progress = if phase < slow {
            phase / slow
        } else {
            1.0 - (phase - slow) / FAST_PHASE_FRACTION
        };
        self.amplitude * (progress - 0.5)
    }

    /// Noise-free pupil centre at time `t`
    pub fn true_position(&self, t: f64) -> (f64, f64) {
        (self.center.0 + self.sawtooth_offset(t), self.center.1)
    }

    /// Whether time `t` falls inside a scheduled blink
    ///
    /// Blinks end on each multiple of `blink_period`, so the recording never
    /// starts closed.
    pub fn is_blink(&self, t: f64) -> bool {
        if self.blink_period <= 0.0 || self.blink_duration <= 0.0 {
            return false;
        }
        t.rem_euclid(self.blink_period) >= self.blink_period - self.blink_duration
    }
}

/// Seeded iterator over synthetic [`EyeFrame`]s
#[derive(Debug, Clone)]
pub struct NystagmusGenerator {
    config: NystagmusConfig,
    rng: ChaCha8Rng,
    noise: Normal<f64>,
    frame_index: usize,
    total_frames: usize,
}

impl NystagmusGenerator {
    /// Create a generator
    ///
    /// # Arguments
    /// * `config` - Recording parameters
    /// * `seed` - RNG seed; equal seeds give identical recordings
    ///
    /// # Returns
    /// Error if `noise_std` is negative or not finite
    pub fn new(config: NystagmusConfig, seed: u64) -> Result<Self, NormalError> {
        let noise = Normal::new(0.0, config.noise_std)?;
        let total_frames = config.frame_count();
        Ok(Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise,
            frame_index: 0,
            total_frames,
        })
    }

    pub fn config(&self) -> &NystagmusConfig {
        &self.config
    }

    fn frame_at(&mut self, t: f64) -> EyeFrame {
        if self.config.is_blink(t) {
            return EyeFrame::new(t, None);
        }

        let (mut x, mut y) = self.config.true_position(t);
        x += self.noise.sample(&mut self.rng);
        y += self.noise.sample(&mut self.rng);

        let spike_p = self.config.spike_probability.clamp(0.0, 1.0);
        if self.rng.random_bool(spike_p) {
            let sign = if self.rng.random_bool(0.5) { 1.0 } else { -1.0 };
            x += sign * self.config.spike_magnitude;
        }

        EyeFrame::new(t, Some(PupilCircle::new(x, y, self.config.radius)))
    }
}

impl Iterator for NystagmusGenerator {
    type Item = EyeFrame;

    fn next(&mut self) -> Option<EyeFrame> {
        if self.frame_index >= self.total_frames {
            return None;
        }
        let t = self.frame_index as f64 / self.config.frame_rate;
        self.frame_index += 1;
        Some(self.frame_at(t))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_frames - self.frame_index;
        (remaining, Some(remaining))
    }
}
