//! Real-time playout: jitter buffer, reference clock, drift control,
//! stuffing and the engine that ties them to a consumer thread

pub mod buffer;
pub mod clock;
pub mod config;
pub mod drift;
pub mod engine;
pub mod playout;
pub mod stuffer;
pub mod volume;


pub use buffer::{BufferStats, Frame, JitterBuffer, PutOutcome};
pub use clock::{Clock, ManualClock, MonotonicClock, ReferenceClock};
pub use config::{PlayoutConfig, RateCorrection, SessionConfig};
pub use drift::{DriftController, FixedRate, RateCorrector};
pub use engine::{PlayoutEngine, PlayoutStats};
pub use playout::{PlayoutState, ResendRequester};
pub use stuffer::Stuffer;
pub use volume::VolumeControl;
