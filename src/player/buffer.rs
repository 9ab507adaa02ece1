//! Fixed-capacity jitter buffer indexed by RTP sequence number
//!
//! Slots are addressed by `seq & (capacity - 1)`. `read` is the next frame
//! the playout loop will take and `write` the newest frame received, so the
//! buffer holds `diff(read, write) + 1` frames (zero when `read` has passed
//! `write`).

use crate::protocol::rtp::sequence::{self, SeqNum, SeqRange};

/// One ring position
#[derive(Debug, Clone)]
pub struct BufferSlot {
    /// Whether the slot holds an unread frame
    pub ready: bool,
    /// Sequence number of the frame stored here
    pub sequence: SeqNum,
    /// RTP timestamp of the frame
    pub rtp_timestamp: u32,
    /// Interleaved PCM, always one frame long
    pub pcm: Vec<i16>,
}

/// A frame handed to the playout loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number
    pub sequence: SeqNum,
    /// RTP timestamp of the first sample
    pub rtp_timestamp: u32,
    /// Interleaved PCM
    pub pcm: Vec<i16>,
    /// True if the packet never arrived and `pcm` is silence
    pub missing: bool,
}

/// What `put` did with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// First packet of a session or after a resync
    Synced,
    /// Next packet in sequence
    Expected,
    /// Arrived ahead of the write cursor; the missing range was requested
    Gap(SeqRange),
    /// Arrived late but before its slot was consumed
    Late,
    /// Same frame already buffered
    Duplicate,
    /// Slot already consumed; dropped
    TooLate,
    /// Would lap the read cursor; the buffer was resynced onto it
    Overrun,
    /// Precedes the target timestamp of a pending flush; dropped
    Flushed,
}

/// Jitter buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Packets handed to `put`
    pub packets_received: u64,
    /// Late packets that still made it into their slot
    pub packets_late: u64,
    /// Packets dropped because their slot was consumed
    pub packets_too_late: u64,
    /// Duplicate packets dropped
    pub packets_duplicate: u64,
    /// Packets dropped while waiting for a flush target
    pub packets_flushed: u64,
    /// Frames replaced by silence at read time
    pub frames_missing: u64,
    /// Frames discarded to catch up with a late start
    pub frames_skipped: u64,
    /// Sequence numbers requested for retransmission
    pub resend_requests: u64,
    /// Forced resyncs
    pub overruns: u64,
}

/// Ring of decoded frames shared by the network and playout threads
#[derive(Debug)]
pub struct JitterBuffer {
    slots: Vec<BufferSlot>,
    mask: usize,
    frame_samples: usize,
    frames_per_packet: u32,
    start_fill: usize,
    max_resend_span: u16,
    read: SeqNum,
    write: SeqNum,
    read_timestamp: u32,
    synced: bool,
    buffering: bool,
    discard_before: Option<u32>,
    in_late_burst: bool,
    pending_resends: Vec<SeqRange>,
    stats: BufferStats,
}

impl JitterBuffer {
    /// Create an empty buffer
    ///
    /// `capacity` must be a power of two; `frame_samples` is the interleaved
    /// sample count of one decoded packet.
    #[must_use]
    pub fn new(
        capacity: usize,
        frames_per_packet: u32,
        frame_samples: usize,
        start_fill: usize,
        max_resend_span: u16,
    ) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let slots = (0..capacity)
            .map(|_| BufferSlot {
                ready: false,
                sequence: 0,
                rtp_timestamp: 0,
                pcm: vec![0; frame_samples],
            })
            .collect();

        Self {
            slots,
            mask: capacity - 1,
            frame_samples,
            frames_per_packet,
            start_fill,
            max_resend_span: max_resend_span.max(1),
            read: 0,
            write: 0,
            read_timestamp: 0,
            synced: false,
            buffering: true,
            discard_before: None,
            in_late_burst: false,
            pending_resends: Vec::new(),
            stats: BufferStats::default(),
        }
    }

    /// Slot count
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Next frame to be read
    #[must_use]
    pub fn read_cursor(&self) -> SeqNum {
        self.read
    }

    /// Newest frame received
    #[must_use]
    pub fn write_cursor(&self) -> SeqNum {
        self.write
    }

    /// RTP timestamp of the frame at the read cursor
    #[must_use]
    pub fn read_timestamp(&self) -> u32 {
        self.read_timestamp
    }

    /// Whether a first packet has been accepted since the last reset
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Whether the buffer is still filling before playout
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Mark playout as started or stalled
    pub fn set_buffering(&mut self, buffering: bool) {
        self.buffering = buffering;
    }

    /// Frames between the read and write cursors, inclusive
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn fill(&self) -> usize {
        if !self.synced {
            return 0;
        }
        (i32::from(sequence::diff(self.read, self.write)) + 1).max(0) as usize
    }

    /// Counters since creation
    #[must_use]
    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// Whether the slot for `seq` holds that frame, unread
    #[must_use]
    pub fn is_ready(&self, seq: SeqNum) -> bool {
        let slot = &self.slots[self.index(seq)];
        slot.ready && slot.sequence == seq
    }

    fn index(&self, seq: SeqNum) -> usize {
        usize::from(seq) & self.mask
    }

    fn store(&mut self, seq: SeqNum, rtp_timestamp: u32, pcm: &[i16]) {
        let frame_samples = self.frame_samples;
        let idx = self.index(seq);
        let slot = &mut self.slots[idx];
        slot.ready = true;
        slot.sequence = seq;
        slot.rtp_timestamp = rtp_timestamp;
        slot.pcm.clear();
        slot.pcm.extend_from_slice(&pcm[..pcm.len().min(frame_samples)]);
        slot.pcm.resize(frame_samples, 0);
    }

    fn clear_slots(&mut self) {
        for slot in &mut self.slots {
            slot.ready = false;
        }
    }

    fn resync(&mut self, seq: SeqNum, rtp_timestamp: u32) {
        self.clear_slots();
        self.pending_resends.clear();
        self.read = seq;
        self.write = seq;
        self.read_timestamp = rtp_timestamp;
        self.synced = true;
        self.in_late_burst = false;
    }

    fn request_resend(&mut self, range: SeqRange) {
        let mut first = range.first;
        let mut remaining = range.count;
        while remaining > 0 {
            let count = remaining.min(self.max_resend_span);
            self.pending_resends.push(SeqRange { first, count });
            self.stats.resend_requests += u64::from(count);
            first = first.wrapping_add(count);
            remaining -= count;
        }
    }

    /// Insert a decoded frame
    ///
    /// Missing ranges discovered on the way are queued for
    /// `take_resend_requests`.
    pub fn put(&mut self, seq: SeqNum, rtp_timestamp: u32, pcm: &[i16]) -> PutOutcome {
        self.stats.packets_received += 1;

        if let Some(target) = self.discard_before {
            #[allow(clippy::cast_possible_wrap)]
            let before_target = (rtp_timestamp.wrapping_sub(target) as i32) < 0;
            if before_target {
                self.stats.packets_flushed += 1;
                return PutOutcome::Flushed;
            }
            self.discard_before = None;
        }

        if !self.synced {
            self.resync(seq, rtp_timestamp);
            self.store(seq, rtp_timestamp, pcm);
            tracing::debug!(seq, rtp_timestamp, "Jitter buffer synced");
            return PutOutcome::Synced;
        }

        let ahead_of_write = sequence::diff(self.write, seq);
        if ahead_of_write > 0 {
            #[allow(clippy::cast_sign_loss)]
            let ahead_of_read = sequence::diff(self.read, seq).max(0) as usize;
            if ahead_of_read >= self.capacity() {
                tracing::warn!(
                    seq,
                    read = self.read,
                    capacity = self.capacity(),
                    "Jitter buffer overrun, resyncing"
                );
                self.stats.overruns += 1;
                self.resync(seq, rtp_timestamp);
                self.store(seq, rtp_timestamp, pcm);
                return PutOutcome::Overrun;
            }

            self.in_late_burst = false;
            self.store(seq, rtp_timestamp, pcm);
            let previous = self.write;
            self.write = seq;

            if ahead_of_write == 1 {
                return PutOutcome::Expected;
            }

            let first = previous.wrapping_add(1);
            let last = seq.wrapping_sub(1);
            return match SeqRange::inclusive(first, last) {
                Some(range) => {
                    tracing::trace!(first, last, "Gap detected, requesting resend");
                    self.request_resend(range);
                    PutOutcome::Gap(range)
                }
                None => PutOutcome::Expected,
            };
        }

        if sequence::at_or_after(self.read, seq) {
            if self.is_ready(seq) {
                self.stats.packets_duplicate += 1;
                return PutOutcome::Duplicate;
            }
            self.in_late_burst = false;
            self.stats.packets_late += 1;
            self.store(seq, rtp_timestamp, pcm);
            return PutOutcome::Late;
        }

        self.stats.packets_too_late += 1;
        if !self.in_late_burst {
            self.in_late_burst = true;
            tracing::warn!(seq, read = self.read, "Packet arrived after its slot was played");
        }
        PutOutcome::TooLate
    }

    /// Take the frame at the read cursor and advance
    ///
    /// A slot that never filled yields silence. Returns `None` without
    /// blocking when nothing is buffered. While playing, also queues
    /// last-chance resend requests for frames 16, 32, 64, ... ahead that are
    /// still missing.
    pub fn get(&mut self) -> Option<Frame> {
        if self.fill() == 0 {
            return None;
        }

        let seq = self.read;
        let idx = self.index(seq);
        let rtp_timestamp = self.read_timestamp;
        let frame_samples = self.frame_samples;
        let slot = &mut self.slots[idx];

        let frame = if slot.ready && slot.sequence == seq {
            Frame {
                sequence: seq,
                rtp_timestamp: slot.rtp_timestamp,
                pcm: std::mem::replace(&mut slot.pcm, vec![0; frame_samples]),
                missing: false,
            }
        } else {
            self.stats.frames_missing += 1;
            Frame {
                sequence: seq,
                rtp_timestamp,
                pcm: vec![0; frame_samples],
                missing: true,
            }
        };
        self.slots[idx].ready = false;

        self.read = seq.wrapping_add(1);
        self.read_timestamp = frame.rtp_timestamp.wrapping_add(self.frames_per_packet);

        if !self.buffering {
            self.last_chance_resends();
        }

        Some(frame)
    }

    fn last_chance_resends(&mut self) {
        let horizon = self.start_fill / 2;
        let mut offset = 16usize;
        while offset < horizon {
            #[allow(clippy::cast_possible_truncation)]
            let seq = self.read.wrapping_add(offset as u16);
            if !sequence::at_or_after(seq, self.write) {
                break;
            }
            if !self.is_ready(seq) {
                tracing::trace!(seq, offset, "Last-chance resend");
                self.request_resend(SeqRange { first: seq, count: 1 });
            }
            offset *= 2;
        }
    }

    /// Drop up to `frames` frames from the read side without playing them
    pub fn skip(&mut self, frames: usize) -> usize {
        let mut skipped = 0;
        while skipped < frames && self.fill() > 0 {
            let seq = self.read;
            let idx = self.index(seq);
            let ts = if self.is_ready(seq) {
                self.slots[idx].rtp_timestamp
            } else {
                self.read_timestamp
            };
            self.slots[idx].ready = false;
            self.read = seq.wrapping_add(1);
            self.read_timestamp = ts.wrapping_add(self.frames_per_packet);
            skipped += 1;
        }
        self.stats.frames_skipped += skipped as u64;
        skipped
    }

    /// Resend ranges queued since the last call
    pub fn take_resend_requests(&mut self) -> Vec<SeqRange> {
        std::mem::take(&mut self.pending_resends)
    }

    /// Forget all frames and cursors; the next packet resyncs
    pub fn reset(&mut self) {
        self.clear_slots();
        self.pending_resends.clear();
        self.synced = false;
        self.buffering = true;
        self.in_late_burst = false;
    }

    /// Reset, and if `until` is given drop packets timestamped before it
    pub fn flush(&mut self, until: Option<u32>) {
        self.reset();
        self.discard_before = until;
    }
}
