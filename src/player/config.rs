//! Playout engine configuration

use serde::{Deserialize, Serialize};

use crate::audio::format::StreamParameters;
use crate::error::PlayoutError;

/// Default latency between the sender's clock and our output (2 s at 44.1 kHz)
pub const DEFAULT_LATENCY_SAMPLES: u32 = 88_200;

/// How the engine tracks the sender's sample clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCorrection {
    /// Insert or delete single sample pairs driven by buffer fill
    #[default]
    Stuffing,
    /// Play every frame unmodified
    Disabled,
}

/// Engine-wide settings that outlive a single session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayoutConfig {
    /// Jitter buffer slots (power of two)
    pub buffer_capacity: usize,

    /// Frames buffered before playout is considered healthy
    ///
    /// Half of it bounds how far ahead the last-chance resend check looks.
    pub start_fill: usize,

    /// Latency used when a session does not request one, in samples
    pub default_latency: u32,

    /// Rate correction strategy
    pub rate_correction: RateCorrection,

    /// Largest gap a single resend request may cover
    pub max_resend_span: u16,

    /// Volume applied until the first `set_volume`, in dB
    pub initial_volume_db: f64,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 512,
            start_fill: 220,
            default_latency: DEFAULT_LATENCY_SAMPLES,
            rate_correction: RateCorrection::Stuffing,
            max_resend_span: 128,
            initial_volume_db: 0.0,
        }
    }
}

impl PlayoutConfig {
    /// Set buffer capacity
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set start fill threshold
    #[must_use]
    pub fn start_fill(mut self, frames: usize) -> Self {
        self.start_fill = frames;
        self
    }

    /// Set default latency in samples
    #[must_use]
    pub fn default_latency(mut self, samples: u32) -> Self {
        self.default_latency = samples;
        self
    }

    /// Set rate correction strategy
    #[must_use]
    pub fn rate_correction(mut self, correction: RateCorrection) -> Self {
        self.rate_correction = correction;
        self
    }

    /// Set the maximum resend span
    #[must_use]
    pub fn max_resend_span(mut self, span: u16) -> Self {
        self.max_resend_span = span;
        self
    }

    /// Set the initial volume
    #[must_use]
    pub fn initial_volume_db(mut self, db: f64) -> Self {
        self.initial_volume_db = db;
        self
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns `PlayoutError::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<(), PlayoutError> {
        if !self.buffer_capacity.is_power_of_two() || self.buffer_capacity < 4 {
            return Err(PlayoutError::InvalidConfig(format!(
                "buffer capacity {} is not a power of two >= 4",
                self.buffer_capacity
            )));
        }
        if self.buffer_capacity > usize::from(u16::MAX) / 2 {
            return Err(PlayoutError::InvalidConfig(format!(
                "buffer capacity {} exceeds half the sequence space",
                self.buffer_capacity
            )));
        }
        if self.start_fill == 0 || self.start_fill >= self.buffer_capacity {
            return Err(PlayoutError::InvalidConfig(format!(
                "start fill {} must be within 1..{}",
                self.start_fill, self.buffer_capacity
            )));
        }
        if self.max_resend_span == 0 {
            return Err(PlayoutError::InvalidConfig(
                "max resend span must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-session parameters supplied by the RTSP layer at `start()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Codec, sample rate, frame size and key material
    pub stream: StreamParameters,

    /// Requested latency in samples (`None` uses the engine default)
    pub latency: Option<u32>,
}

impl SessionConfig {
    /// Session with the engine's default latency
    #[must_use]
    pub fn new(stream: StreamParameters) -> Self {
        Self {
            stream,
            latency: None,
        }
    }

    /// Request a specific latency in samples
    #[must_use]
    pub fn with_latency(mut self, samples: u32) -> Self {
        self.latency = Some(samples);
        self
    }

    /// Check the stream parameters
    ///
    /// # Errors
    ///
    /// Returns `PlayoutError::InvalidConfig` if the stream cannot be played.
    pub fn validate(&self) -> Result<(), PlayoutError> {
        self.stream
            .validate()
            .map_err(|e| PlayoutError::InvalidConfig(e.to_string()))?;
        if self.stream.frames_per_packet < 3 {
            return Err(PlayoutError::InvalidConfig(format!(
                "frame size {} too small for rate correction",
                self.stream.frames_per_packet
            )));
        }
        Ok(())
    }
}
