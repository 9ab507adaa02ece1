//! # raop-playout
//!
//! Real-time RTP playout engine for `AirPlay` (RAOP) audio receivers.
//!
//! The engine takes encrypted, lossy, out-of-order audio packets from the
//! network, decrypts and decodes them into a fixed-capacity jitter buffer,
//! and releases PCM to an audio sink at the moment the sender's timeline
//! asks for it. Long-term clock drift between sender and receiver is
//! corrected by inserting or deleting single sample pairs rather than by
//! resampling.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use raop_playout::audio::{AlacConfig, NullSink, StreamParameters};
//! use raop_playout::player::{PlayoutConfig, PlayoutEngine, SessionConfig};
//! use raop_playout::receiver::{ReceiverConfig, RtpReceiver};
//!
//! # fn example() -> Result<(), raop_playout::PlayoutError> {
//! let engine = Arc::new(PlayoutEngine::new(
//!     PlayoutConfig::default(),
//!     Box::new(NullSink::new()),
//! ));
//!
//! let fmtp = AlacConfig::from_fmtp("96 352 0 16 40 10 14 2 255 0 0 44100")
//!     .map_err(|e| raop_playout::PlayoutError::InvalidConfig(e.to_string()))?;
//! let stream = StreamParameters::alac(fmtp).with_encryption([0u8; 16], [0u8; 16]);
//! engine.start(SessionConfig::new(stream))?;
//!
//! let receiver = RtpReceiver::bind(&ReceiverConfig::default(), engine.clone())?;
//! // ... RTSP FLUSH / TEARDOWN map to engine.flush() / engine.stop()
//! receiver.shutdown();
//! engine.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **`protocol`**: RTP packet formats, sequence arithmetic, AES-CBC
//! - **`audio`**: stream parameters, decoders, audio sinks
//! - **`player`**: jitter buffer, clocks, drift control, the engine
//! - **`receiver`**: blocking UDP receive threads

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;

/// Testing utilities
pub mod testing;

pub mod audio;
pub mod player;
pub mod protocol;
pub mod receiver;


// Re-exports
pub use audio::{AudioSink, StreamParameters};
pub use error::PlayoutError;
pub use player::{PlayoutConfig, PlayoutEngine, PlayoutState, PlayoutStats, SessionConfig};
pub use receiver::{ReceiverConfig, RtpReceiver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::audio::{AlacConfig, AudioCodec, AudioSink, NullSink, StreamParameters};
    pub use crate::player::{
        PlayoutConfig, PlayoutEngine, PlayoutState, PlayoutStats, RateCorrection,
        ResendRequester, SessionConfig,
    };
    pub use crate::receiver::{ReceiverConfig, RtpReceiver};
    pub use crate::PlayoutError;
}
