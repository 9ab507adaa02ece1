//! Audio sink abstraction
//!
//! The engine pushes interleaved 16-bit stereo PCM into a sink. Device
//! backends, pipes and test captures implement the same trait.

use std::io::Write;

/// Errors from audio sinks
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Device not found
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Stream error
    #[error("stream error: {0}")]
    StreamError(String),

    /// Output closed
    #[error("output closed")]
    Closed,

    /// Underlying writer failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for rendered PCM
///
/// Only `start`, `play` and `stop` are mandatory. A sink that can report
/// how many frames it still has queued returns `Some` from `delay`; a return
/// of `Some(0)` while playing is treated as an underrun.
pub trait AudioSink: Send {
    /// Open the output at the stream's sample rate
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the device cannot be opened.
    fn start(&mut self, sample_rate: u32) -> Result<(), SinkError>;

    /// Queue `frames` stereo frames of interleaved samples
    ///
    /// `samples.len()` is `frames * 2`. Device sinks may block until there is
    /// room.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the device rejects the write.
    fn play(&mut self, samples: &[i16], frames: usize) -> Result<(), SinkError>;

    /// Close the output
    fn stop(&mut self);

    /// Discard anything queued but not yet heard
    fn flush(&mut self) {}

    /// Frames queued in the output and not yet heard
    fn delay(&self) -> Option<usize> {
        None
    }

    /// Whether the sink applies volume itself
    fn has_hardware_volume(&self) -> bool {
        false
    }

    /// Set hardware volume in dB (only called if `has_hardware_volume`)
    fn set_volume(&mut self, _db: f64) {}

    /// Sink name for logs
    fn name(&self) -> &'static str;
}

/// Sink that discards all audio
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    /// Create a new null sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames played since creation
    #[must_use]
    pub fn frames_played(&self) -> u64 {
        self.frames
    }
}

impl AudioSink for NullSink {
    fn start(&mut self, _sample_rate: u32) -> Result<(), SinkError> {
        Ok(())
    }

    fn play(&mut self, _samples: &[i16], frames: usize) -> Result<(), SinkError> {
        self.frames += frames as u64;
        Ok(())
    }

    fn stop(&mut self) {}

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Sink writing raw signed 16-bit little-endian PCM to any writer
///
/// Pipe it into `aplay -f cd` or a file.
pub struct WriterSink<W: Write + Send> {
    writer: W,
    bytes: Vec<u8>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes: Vec::new(),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> AudioSink for WriterSink<W> {
    fn start(&mut self, _sample_rate: u32) -> Result<(), SinkError> {
        Ok(())
    }

    fn play(&mut self, samples: &[i16], _frames: usize) -> Result<(), SinkError> {
        self.bytes.clear();
        self.bytes
            .extend(samples.iter().flat_map(|s| s.to_le_bytes()));
        self.writer.write_all(&self.bytes)?;
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("Failed to flush PCM writer: {}", e);
        }
    }

    fn name(&self) -> &'static str {
        "writer"
    }
}
