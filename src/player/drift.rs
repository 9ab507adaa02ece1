//! Playback rate correction
//!
//! The controller watches how many frames sit in the jitter buffer each
//! time one is consumed. After a warm-up that fixes the desired fill, the
//! fill error and its derivative are smoothed by biquad low-pass filters
//! into a playback rate near 1.0, which is realised by inserting or
//! deleting one sample pair in a frame with the matching probability.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Frames averaged to establish the desired fill
pub const WARMUP_FRAMES: u32 = 1000;

/// Gain applied to the smoothed fill error
const ERROR_GAIN: f64 = 1e-4;

/// Weight of the new correction fed into the drift filter
const DRIFT_FEEDBACK: f64 = 0.1;

/// Second-order low-pass filter (direct form II)
#[derive(Debug, Clone)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    hist: [f64; 2],
}

impl Biquad {
    /// Low-pass filter run once per frame
    ///
    /// `freq` is the cutoff in units of the per-sample rate, so the effective
    /// angular frequency scales with `frame_size`.
    #[must_use]
    pub fn low_pass(freq: f64, q: f64, frame_size: u32, sample_rate: u32) -> Self {
        let w0 = 2.0 * PI * freq * f64::from(frame_size) / f64::from(sample_rate);
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        let cos = w0.cos();

        let b0 = (1.0 - cos) / (2.0 * a0);
        Self {
            b: [b0, (1.0 - cos) / a0, b0],
            a: [-2.0 * cos / a0, (1.0 - alpha) / a0],
            hist: [0.0; 2],
        }
    }

    /// Feed one input and return the filtered output
    pub fn filter(&mut self, input: f64) -> f64 {
        let w = input - self.a[0] * self.hist[0] - self.a[1] * self.hist[1];
        let out = self.b[1] * self.hist[0] + self.b[2] * self.hist[1] + self.b[0] * w;
        self.hist[1] = self.hist[0];
        self.hist[0] = w;
        out
    }

    /// Clear filter history
    pub fn reset(&mut self) {
        self.hist = [0.0; 2];
    }
}

/// Probability that one frame of `frame_size` sample pairs needs one stuffed pair
#[must_use]
pub fn stuff_probability(rate: f64, frame_size: u32) -> f64 {
    #[allow(clippy::cast_possible_wrap)]
    let n = frame_size as i32;
    1.0 - (1.0 - (rate - 1.0).abs()).powi(n)
}

/// Stuffing direction for a rate given a uniform draw in `[0, 1)`
///
/// Running fast (rate above 1) means the buffer is filling, so a sample pair
/// is deleted; running slow inserts one.
#[must_use]
pub fn stuff_for_draw(rate: f64, frame_size: u32, draw: f64) -> i8 {
    if draw < stuff_probability(rate, frame_size) {
        if rate > 1.0 { -1 } else { 1 }
    } else {
        0
    }
}

/// Strategy deciding how many sample pairs to add to each frame
pub trait RateCorrector: Send {
    /// Observe the current fill and return `-1`, `0` or `+1`
    fn correction(&mut self, fill: usize) -> i8;

    /// Current playback rate estimate
    fn playback_rate(&self) -> f64;

    /// Forget all state (on every resync)
    fn reset(&mut self);
}

/// Plays every frame unmodified
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedRate;

impl RateCorrector for FixedRate {
    fn correction(&mut self, _fill: usize) -> i8 {
        0
    }

    fn playback_rate(&self) -> f64 {
        1.0
    }

    fn reset(&mut self) {}
}

/// Fill-driven drift controller
#[derive(Debug, Clone)]
pub struct DriftController {
    frame_size: u32,
    error_lpf: Biquad,
    derivative_lpf: Biquad,
    drift_lpf: Biquad,
    warmup: u32,
    desired_fill: f64,
    error: f64,
    last_error: f64,
    drift: f64,
    rate: f64,
    rng: StdRng,
}

impl DriftController {
    /// Controller for a stream
    #[must_use]
    pub fn new(frame_size: u32, sample_rate: u32) -> Self {
        Self::with_rng(frame_size, sample_rate, StdRng::from_entropy())
    }

    /// Controller with a reproducible stuffing draw
    #[must_use]
    pub fn with_seed(frame_size: u32, sample_rate: u32, seed: u64) -> Self {
        Self::with_rng(frame_size, sample_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(frame_size: u32, sample_rate: u32, rng: StdRng) -> Self {
        Self {
            frame_size,
            error_lpf: Biquad::low_pass(1.0 / 10.0, 0.25, frame_size, sample_rate),
            derivative_lpf: Biquad::low_pass(1.0 / 2.0, 0.2, frame_size, sample_rate),
            drift_lpf: Biquad::low_pass(1.0 / 180.0, 0.3, frame_size, sample_rate),
            warmup: 0,
            desired_fill: 0.0,
            error: 0.0,
            last_error: 0.0,
            drift: 0.0,
            rate: 1.0,
            rng,
        }
    }

    /// Feed the current fill and return the new playback rate
    #[allow(clippy::cast_precision_loss)]
    pub fn update(&mut self, fill: usize) -> f64 {
        let fill = fill as f64;

        if self.warmup < WARMUP_FRAMES {
            self.desired_fill += fill / f64::from(WARMUP_FRAMES);
            self.warmup += 1;
            if self.warmup == WARMUP_FRAMES {
                tracing::debug!(desired_fill = self.desired_fill, "Drift warm-up complete");
            }
            return self.rate;
        }

        self.error = self.error_lpf.filter(fill - self.desired_fill);
        let derivative = self.derivative_lpf.filter(self.error - self.last_error);
        self.last_error = self.error;

        let adjustment = ERROR_GAIN * self.error;
        self.drift = self
            .drift_lpf
            .filter(DRIFT_FEEDBACK * (adjustment + derivative) + self.drift);
        self.rate = 1.0 + adjustment + self.drift;
        self.rate
    }

    /// Whether the warm-up is over
    #[must_use]
    pub fn is_warmed_up(&self) -> bool {
        self.warmup >= WARMUP_FRAMES
    }

    /// Fill established during warm-up
    #[must_use]
    pub fn desired_fill(&self) -> f64 {
        self.desired_fill
    }

    /// Smoothed fill error
    #[must_use]
    pub fn error(&self) -> f64 {
        self.error
    }
}

impl RateCorrector for DriftController {
    fn correction(&mut self, fill: usize) -> i8 {
        let rate = self.update(fill);
        let draw: f64 = self.rng.r#gen();
        let stuff = stuff_for_draw(rate, self.frame_size, draw);
        if stuff != 0 {
            tracing::trace!(stuff, rate, fill, "Stuffing");
        }
        stuff
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn reset(&mut self) {
        self.error_lpf.reset();
        self.derivative_lpf.reset();
        self.drift_lpf.reset();
        self.warmup = 0;
        self.desired_fill = 0.0;
        self.error = 0.0;
        self.last_error = 0.0;
        self.drift = 0.0;
        self.rate = 1.0;
    }
}
