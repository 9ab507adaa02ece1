use std::io;
use thiserror::Error;

use crate::audio::decoder::DecodeError;
use crate::audio::sink::SinkError;

/// Errors reported by the playout engine and network receiver
///
/// Per-packet faults (loss, lateness, undecodable payloads) are never
/// reported here; they are absorbed by silence substitution and counted in
/// the engine statistics.
#[derive(Debug, Error)]
pub enum PlayoutError {
    /// Engine or session configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Decoder could not be created for the session
    #[error("decoder initialization failed: {0}")]
    Decoder(#[from] DecodeError),

    /// Audio sink failed to open or is unavailable
    #[error("audio sink error: {0}")]
    Sink(#[from] SinkError),

    /// `start` called while a session is active
    #[error("playout session already running")]
    AlreadyRunning,

    /// Operation needs an active session
    #[error("no playout session running")]
    NotRunning,

    /// The playout or receiver thread could not be spawned
    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    /// Socket setup failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PlayoutError {
    /// Check if the caller can retry after fixing session state
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning | Self::NotRunning | Self::Sink(_) | Self::Io(_)
        )
    }
}

/// Result type alias for playout operations
pub type Result<T> = std::result::Result<T, PlayoutError>;
