//! Wraparound arithmetic over 16-bit RTP sequence numbers
//!
//! Sequence numbers wrap every 65536 packets (roughly 25 minutes of
//! 352-frame packets at 44.1 kHz), so ordering is always decided on the
//! signed 16-bit difference, never on the raw unsigned values.

/// RTP sequence number
pub type SeqNum = u16;

/// Signed distance from `a` to `b` (`b - a` as a two's complement `i16`)
#[must_use]
#[inline]
#[allow(clippy::cast_possible_wrap)]
pub fn diff(a: SeqNum, b: SeqNum) -> i16 {
    b.wrapping_sub(a) as i16
}

/// True if `b` comes strictly after `a`
#[must_use]
#[inline]
pub fn after(a: SeqNum, b: SeqNum) -> bool {
    diff(a, b) > 0
}

/// True if `b` is `a` or comes after it
#[must_use]
#[inline]
pub fn at_or_after(a: SeqNum, b: SeqNum) -> bool {
    diff(a, b) >= 0
}

/// Inclusive span of sequence numbers, possibly crossing the wrap point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    /// First sequence number in the span
    pub first: SeqNum,
    /// Number of packets covered
    pub count: u16,
}

impl SeqRange {
    /// Span from `first` to `last` inclusive, or `None` if `last` precedes `first`
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn inclusive(first: SeqNum, last: SeqNum) -> Option<Self> {
        let d = diff(first, last);
        if d < 0 {
            return None;
        }
        Some(Self {
            first,
            count: d as u16 + 1,
        })
    }

    /// Last sequence number in the span
    #[must_use]
    pub fn last(&self) -> SeqNum {
        self.first.wrapping_add(self.count.saturating_sub(1))
    }

    /// Whether `seq` falls within the span
    #[must_use]
    pub fn contains(&self, seq: SeqNum) -> bool {
        self.count > 0 && at_or_after(self.first, seq) && at_or_after(seq, self.last())
    }

    /// Iterate over every sequence number in the span
    pub fn iter(&self) -> impl Iterator<Item = SeqNum> + '_ {
        (0..self.count).map(move |i| self.first.wrapping_add(i))
    }
}
