//! Resend requester that records instead of sending

use std::sync::{Mutex, PoisonError};

use crate::player::ResendRequester;
use crate::protocol::rtp::SeqRange;

/// Collects every resend request the engine makes
#[derive(Debug, Default)]
pub struct ResendLog {
    requests: Mutex<Vec<SeqRange>>,
}

impl ResendLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests made so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<SeqRange> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests covering `seq`
    #[must_use]
    pub fn count_for(&self, seq: u16) -> usize {
        self.requests().iter().filter(|r| r.contains(seq)).count()
    }
}

impl ResendRequester for ResendLog {
    fn request_resend(&self, range: SeqRange) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(range);
    }
}
