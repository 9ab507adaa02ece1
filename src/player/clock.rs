//! Local time source and the RTP-to-local reference clock
//!
//! Local times are 32.32 fixed-point seconds on a monotonic clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One second in 32.32 fixed point
pub const FIXED_ONE_SECOND: u64 = 1 << 32;

/// Convert a duration to 32.32 fixed-point seconds
#[must_use]
pub fn duration_to_fixed(d: Duration) -> u64 {
    (d.as_secs() << 32) + ((u64::from(d.subsec_nanos()) << 32) / 1_000_000_000)
}

/// Convert 32.32 fixed-point seconds to a duration
#[must_use]
pub fn fixed_to_duration(t: u64) -> Duration {
    let secs = t >> 32;
    let nanos = ((t & 0xFFFF_FFFF) * 1_000_000_000) >> 32;
    #[allow(clippy::cast_possible_truncation)]
    Duration::new(secs, nanos as u32)
}

/// Fixed-point duration of `samples` at `sample_rate`
#[must_use]
pub fn samples_to_fixed(samples: i64, sample_rate: u32) -> i64 {
    (samples << 32) / i64::from(sample_rate)
}

/// Samples covered by a fixed-point duration, rounded to nearest
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn fixed_to_samples(t: i64, sample_rate: u32) -> i64 {
    ((i128::from(t) * i128::from(sample_rate) + (1 << 31)) >> 32) as i64
}

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Current local time in 32.32 fixed-point seconds
    fn now(&self) -> u64;
}

/// `Instant`-backed clock measured from its creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a new clock at zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        duration_to_fixed(self.origin.elapsed())
    }
}

/// Manually advanced clock for tests
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at `start` fixed-point seconds
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Set the current time
    pub fn set(&self, t: u64) {
        self.now.store(t, Ordering::SeqCst);
    }

    /// Move time forward
    pub fn advance(&self, d: Duration) {
        self.now.fetch_add(duration_to_fixed(d), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// RTP timestamp and the local time it corresponds to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceAnchor {
    /// RTP timestamp
    pub rtp_timestamp: u32,
    /// Local time in 32.32 fixed-point seconds
    pub local_time: u64,
}

/// Projects RTP timestamps onto local time from the latest anchor
#[derive(Debug, Clone)]
pub struct ReferenceClock {
    sample_rate: u32,
    anchor: Option<ReferenceAnchor>,
}

impl ReferenceClock {
    /// Clock without an anchor
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            anchor: None,
        }
    }

    /// Replace the anchor
    pub fn set_anchor(&mut self, rtp_timestamp: u32, local_time: u64) {
        self.anchor = Some(ReferenceAnchor {
            rtp_timestamp,
            local_time,
        });
    }

    /// Forget the anchor
    pub fn clear(&mut self) {
        self.anchor = None;
    }

    /// Current anchor, if any
    #[must_use]
    pub fn anchor(&self) -> Option<ReferenceAnchor> {
        self.anchor
    }

    /// Whether an anchor is live
    #[must_use]
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    /// Local time at which `rtp_timestamp` should leave the device
    ///
    /// The timestamp difference is taken as signed 32-bit so that
    /// timestamps just before the anchor project into the past.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn predict(&self, rtp_timestamp: u32) -> Option<u64> {
        let anchor = self.anchor?;
        let delta = i64::from(rtp_timestamp.wrapping_sub(anchor.rtp_timestamp) as i32);
        let offset = samples_to_fixed(delta, self.sample_rate);
        Some(anchor.local_time.saturating_add_signed(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_round_trip() {
        let d = Duration::from_millis(1500);
        assert_eq!(duration_to_fixed(d), FIXED_ONE_SECOND + FIXED_ONE_SECOND / 2);
        let back = fixed_to_duration(duration_to_fixed(d));
        assert!(back.abs_diff(d) < Duration::from_nanos(2));
    }

    #[test]
    fn test_predict_without_anchor() {
        let clock = ReferenceClock::new(44_100);
        assert_eq!(clock.predict(1234), None);
    }

    #[test]
    fn test_predict_projects_linearly() {
        let mut clock = ReferenceClock::new(44_100);
        clock.set_anchor(1000, 10 * FIXED_ONE_SECOND);

        assert_eq!(clock.predict(1000), Some(10 * FIXED_ONE_SECOND));
        assert_eq!(clock.predict(1000 + 44_100), Some(11 * FIXED_ONE_SECOND));
        assert_eq!(clock.predict(1000u32.wrapping_sub(44_100)), Some(9 * FIXED_ONE_SECOND));
    }

    #[test]
    fn test_predict_across_timestamp_wrap() {
        let mut clock = ReferenceClock::new(44_100);
        clock.set_anchor(u32::MAX - 100, 5 * FIXED_ONE_SECOND);

        let predicted = clock.predict(44_100 - 101).unwrap();
        assert_eq!(predicted, 6 * FIXED_ONE_SECOND);
    }

    #[test]
    fn test_clear_removes_anchor() {
        let mut clock = ReferenceClock::new(44_100);
        clock.set_anchor(1, 1);
        assert!(clock.is_anchored());
        clock.clear();
        assert!(!clock.is_anchored());
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(0);
        let other = clock.clone();
        clock.advance(Duration::from_secs(2));
        assert_eq!(other.now(), 2 * FIXED_ONE_SECOND);
    }

    #[test]
    fn test_samples_conversions() {
        assert_eq!(samples_to_fixed(44_100, 44_100), 1 << 32);
        assert_eq!(fixed_to_samples(1 << 32, 44_100), 44_100);
        assert_eq!(fixed_to_samples(-(1 << 32), 44_100), -44_100);
    }
}
