//! Recording audio sink for tests

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio::sink::{AudioSink, SinkError};

/// Everything a `CaptureSink` has seen
#[derive(Debug, Default, Clone)]
pub struct Captured {
    /// Sample rate passed to `start`
    pub started_at_rate: Option<u32>,
    /// One entry per `play` call
    pub chunks: Vec<Vec<i16>>,
    /// Number of `flush` calls
    pub flushes: usize,
    /// Whether `stop` was called
    pub stopped: bool,
    /// Hardware volume updates in dB
    pub volumes: Vec<f64>,
}

impl Captured {
    /// All played samples, concatenated
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.chunks.concat()
    }

    /// Total stereo frames played
    #[must_use]
    pub fn frames(&self) -> usize {
        self.chunks.iter().map(|c| c.len() / 2).sum()
    }
}

/// Shared view onto a `CaptureSink` from the test thread
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    inner: Arc<Mutex<Captured>>,
    delay: Arc<Mutex<Option<usize>>>,
}

impl CaptureHandle {
    /// Lock and inspect the capture
    pub fn lock(&self) -> MutexGuard<'_, Captured> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the capture
    #[must_use]
    pub fn snapshot(&self) -> Captured {
        self.lock().clone()
    }

    /// Change the delay the sink reports
    pub fn set_delay(&self, delay: Option<usize>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }
}

/// Sink that records every call instead of producing sound
#[derive(Debug)]
pub struct CaptureSink {
    handle: CaptureHandle,
    hardware_volume: bool,
}

impl CaptureSink {
    /// Create a sink and the handle used to inspect it
    #[must_use]
    pub fn new() -> (Self, CaptureHandle) {
        let handle = CaptureHandle {
            inner: Arc::new(Mutex::new(Captured::default())),
            delay: Arc::new(Mutex::new(None)),
        };
        (
            Self {
                handle: handle.clone(),
                hardware_volume: false,
            },
            handle,
        )
    }

    /// Report a hardware mixer
    #[must_use]
    pub fn with_hardware_volume(mut self) -> Self {
        self.hardware_volume = true;
        self
    }
}

impl AudioSink for CaptureSink {
    fn start(&mut self, sample_rate: u32) -> Result<(), SinkError> {
        self.handle.lock().started_at_rate = Some(sample_rate);
        Ok(())
    }

    fn play(&mut self, samples: &[i16], frames: usize) -> Result<(), SinkError> {
        debug_assert_eq!(samples.len(), frames * 2);
        self.handle.lock().chunks.push(samples.to_vec());
        Ok(())
    }

    fn stop(&mut self) {
        self.handle.lock().stopped = true;
    }

    fn flush(&mut self) {
        self.handle.lock().flushes += 1;
    }

    fn delay(&self) -> Option<usize> {
        *self.handle.delay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_hardware_volume(&self) -> bool {
        self.hardware_volume
    }

    fn set_volume(&mut self, db: f64) {
        self.handle.lock().volumes.push(db);
    }

    fn name(&self) -> &'static str {
        "capture"
    }
}
