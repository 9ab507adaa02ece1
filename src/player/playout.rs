//! Consumer side of the engine: waits for data and a timing anchor, plays
//! lead-in silence up to the anchor-derived start time, then pulls frames
//! through rate correction and volume into the sink

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::buffer::{Frame, JitterBuffer};
use super::clock::{Clock, ReferenceClock, fixed_to_samples, samples_to_fixed};
use super::drift::RateCorrector;
use super::stuffer::Stuffer;
use super::volume::VolumeControl;
use crate::audio::format::CHANNELS;
use crate::audio::sink::AudioSink;
use crate::protocol::rtp::SeqRange;

/// Playout phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayoutState {
    /// Collecting packets; nothing is played
    Buffering,
    /// Playing lead-in silence until the first frame is due
    Synchronizing,
    /// Releasing frames to the sink
    Playing,
}

/// Sends retransmission requests to the sender
///
/// Called without any engine lock held. Requests are fire-and-forget.
pub trait ResendRequester: Send + Sync {
    /// Ask for `range` to be sent again
    fn request_resend(&self, range: SeqRange);
}

/// Session state guarded by the buffer lock
#[derive(Debug)]
pub(crate) struct SessionState {
    pub buffer: JitterBuffer,
    pub reference: ReferenceClock,
    pub phase: PlayoutState,
    pub flush_pending: bool,
    pub stop: bool,
}

/// Counters updated outside the buffer lock
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub decode_failures: AtomicU64,
    pub underruns: AtomicU64,
    pub frames_played: AtomicU64,
    pub silence_samples: AtomicU64,
    pub samples_inserted: AtomicU64,
    pub samples_deleted: AtomicU64,
    pub sink_errors: AtomicU64,
    playback_rate: AtomicU64,
}

impl Counters {
    pub fn reset(&self) {
        for counter in [
            &self.decode_failures,
            &self.underruns,
            &self.frames_played,
            &self.silence_samples,
            &self.samples_inserted,
            &self.samples_deleted,
            &self.sink_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.set_playback_rate(1.0);
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.playback_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn playback_rate(&self) -> f64 {
        match self.playback_rate.load(Ordering::Relaxed) {
            0 => 1.0,
            bits => f64::from_bits(bits),
        }
    }
}

/// Everything the producer, consumer and control threads share
pub(crate) struct Shared {
    pub session: Mutex<Option<SessionState>>,
    pub ready: Condvar,
    pub volume: VolumeControl,
    pub counters: Counters,
    pub clock: Arc<dyn Clock>,
    pub resender: Mutex<Option<Arc<dyn ResendRequester>>>,
}

impl Shared {
    pub fn new(clock: Arc<dyn Clock>, initial_volume_db: f64) -> Self {
        Self {
            session: Mutex::new(None),
            ready: Condvar::new(),
            volume: VolumeControl::new(initial_volume_db),
            counters: Counters::default(),
            clock,
            resender: Mutex::new(None),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Option<SessionState>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send queued resend requests; must be called with no lock held
    pub fn send_resends(&self, ranges: Vec<SeqRange>) {
        if ranges.is_empty() {
            return;
        }
        let resender = self
            .resender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(resender) = resender else {
            return;
        };
        for range in ranges {
            tracing::trace!(first = range.first, count = range.count, "Requesting resend");
            resender.request_resend(range);
        }
    }
}

enum Step {
    Exit,
    Idle,
    Flushed,
    Underrun,
    Silence(usize),
    Frame {
        frame: Frame,
        fill: usize,
        resends: Vec<SeqRange>,
    },
}

/// Lead-in progress for sinks that cannot report their delay
#[derive(Debug, Clone, Copy)]
struct LeadIn {
    started: u64,
    emitted: u64,
}

pub(crate) struct PlayoutLoop {
    shared: Arc<Shared>,
    sink: Box<dyn AudioSink>,
    corrector: Box<dyn RateCorrector>,
    stuffer: Stuffer,
    frames_per_packet: u32,
    sample_rate: u32,
    latency: u32,
    wait: Duration,
    lead_in: Option<LeadIn>,
    played_since_sync: bool,
    out: Vec<i16>,
}

impl PlayoutLoop {
    pub fn new(
        shared: Arc<Shared>,
        sink: Box<dyn AudioSink>,
        corrector: Box<dyn RateCorrector>,
        frames_per_packet: u32,
        sample_rate: u32,
        latency: u32,
    ) -> Self {
        let frame = Duration::from_secs_f64(f64::from(frames_per_packet) / f64::from(sample_rate));
        Self {
            shared,
            sink,
            corrector,
            stuffer: Stuffer::new(),
            frames_per_packet,
            sample_rate,
            latency,
            wait: frame * 4 / 3,
            lead_in: None,
            played_since_sync: false,
            out: Vec::with_capacity(frames_per_packet as usize * CHANNELS + CHANNELS),
        }
    }

    /// Run until `stop`, then hand the sink back
    pub fn run(mut self) -> Box<dyn AudioSink> {
        tracing::info!(sink = self.sink.name(), latency = self.latency, "Playout started");

        loop {
            if let Some(db) = self.shared.volume.take_hardware_update() {
                self.sink.set_volume(db);
            }
            let sink_delay = self.sink.delay();

            match self.next_step(sink_delay) {
                Step::Exit => break,
                Step::Idle => {}
                Step::Flushed => {
                    self.sink.flush();
                    self.lead_in = None;
                    self.played_since_sync = false;
                }
                Step::Underrun => {
                    self.lead_in = None;
                    self.played_since_sync = false;
                }
                Step::Silence(frames) => self.play_silence(frames),
                Step::Frame {
                    frame,
                    fill,
                    resends,
                } => {
                    self.shared.send_resends(resends);
                    self.play_frame(&frame, fill);
                }
            }
        }

        self.sink.stop();
        tracing::info!(sink = self.sink.name(), "Playout stopped");
        self.sink
    }

    fn next_step(&mut self, sink_delay: Option<usize>) -> Step {
        let shared = Arc::clone(&self.shared);
        let mut guard = shared.lock();

        loop {
            let Some(session) = guard.as_mut() else {
                return Step::Exit;
            };
            if session.stop {
                return Step::Exit;
            }
            if session.flush_pending {
                session.flush_pending = false;
                return Step::Flushed;
            }

            match session.phase {
                PlayoutState::Buffering => {
                    if self.ready_to_sync(session) {
                        session.phase = PlayoutState::Synchronizing;
                        self.lead_in = Some(LeadIn {
                            started: self.shared.clock.now(),
                            emitted: 0,
                        });
                        tracing::debug!(
                            seq = session.buffer.read_cursor(),
                            rtp_timestamp = session.buffer.read_timestamp(),
                            "Anchor available, synchronizing"
                        );
                        continue;
                    }
                }
                PlayoutState::Synchronizing => {
                    if !self.ready_to_sync(session) {
                        tracing::debug!("Lost data or anchor while synchronizing");
                        session.phase = PlayoutState::Buffering;
                        self.lead_in = None;
                        continue;
                    }
                    match self.lead_in_step(session, sink_delay) {
                        Some(step) => return step,
                        None => continue,
                    }
                }
                PlayoutState::Playing => {
                    if self.played_since_sync && sink_delay == Some(0) {
                        tracing::warn!(
                            fill = session.buffer.fill(),
                            "Output underrun, resynchronizing"
                        );
                        session.buffer.reset();
                        session.phase = PlayoutState::Buffering;
                        Counters::bump(&self.shared.counters.underruns);
                        return Step::Underrun;
                    }
                    if let Some(frame) = session.buffer.get() {
                        return Step::Frame {
                            fill: session.buffer.fill(),
                            resends: session.buffer.take_resend_requests(),
                            frame,
                        };
                    }
                }
            }

            // Timed so flush and stop are noticed without network activity.
            drop(
                shared
                    .ready
                    .wait_timeout(guard, self.wait)
                    .unwrap_or_else(PoisonError::into_inner),
            );
            return Step::Idle;
        }
    }

    fn ready_to_sync(&self, session: &SessionState) -> bool {
        session.buffer.is_synced()
            && session.buffer.fill() > 0
            && session.reference.is_anchored()
    }

    /// One lead-in decision: more silence, the final partial gap, or start
    ///
    /// Returns `None` once playout has started and frames should be pulled.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn lead_in_step(
        &mut self,
        session: &mut SessionState,
        sink_delay: Option<usize>,
    ) -> Option<Step> {
        let predicted = session.reference.predict(session.buffer.read_timestamp())?;
        let latency = samples_to_fixed(i64::from(self.latency), self.sample_rate) as u64;
        let target = predicted.saturating_add(latency);
        let now = self.shared.clock.now();
        let lead_in = *self.lead_in.get_or_insert(LeadIn {
            started: now,
            emitted: 0,
        });

        let horizon = match sink_delay {
            Some(queued) => {
                now.saturating_add(samples_to_fixed(queued as i64, self.sample_rate) as u64)
            }
            None => {
                let emitted = samples_to_fixed(lead_in.emitted as i64, self.sample_rate) as u64;
                now.max(lead_in.started.saturating_add(emitted))
            }
        };

        let gap = target.wrapping_sub(horizon) as i64;
        let frame_time = samples_to_fixed(i64::from(self.frames_per_packet), self.sample_rate);

        if gap > frame_time {
            self.note_emitted(u64::from(self.frames_per_packet));
            return Some(Step::Silence(self.frames_per_packet as usize));
        }

        self.enter_playing(session);

        if gap > 0 {
            let samples = fixed_to_samples(gap, self.sample_rate) as usize;
            if samples > 0 {
                self.note_emitted(samples as u64);
                return Some(Step::Silence(samples));
            }
            return None;
        }

        let late_frames = ((-gap) / frame_time) as usize;
        if late_frames > 0 {
            let skipped = session.buffer.skip(late_frames);
            tracing::warn!(late_frames, skipped, "Start time already passed, skipping frames");
        }
        None
    }

    fn note_emitted(&mut self, samples: u64) {
        if let Some(lead_in) = self.lead_in.as_mut() {
            lead_in.emitted += samples;
        }
    }

    fn enter_playing(&mut self, session: &mut SessionState) {
        session.phase = PlayoutState::Playing;
        session.buffer.set_buffering(false);
        self.lead_in = None;
        self.played_since_sync = false;
        self.corrector.reset();
        self.shared.counters.set_playback_rate(1.0);
        tracing::debug!(
            seq = session.buffer.read_cursor(),
            fill = session.buffer.fill(),
            "Playout synchronized"
        );
    }

    fn play_silence(&mut self, frames: usize) {
        self.out.clear();
        self.out.resize(frames * CHANNELS, 0);
        if let Err(e) = self.sink.play(&self.out, frames) {
            tracing::warn!(error = %e, "Sink rejected lead-in silence");
            Counters::bump(&self.shared.counters.sink_errors);
        }
        self.shared
            .counters
            .silence_samples
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    fn play_frame(&mut self, frame: &Frame, fill: usize) {
        let stuff = self.corrector.correction(fill);
        let counters = &self.shared.counters;
        counters.set_playback_rate(self.corrector.playback_rate());
        match stuff {
            1 => Counters::bump(&counters.samples_inserted),
            -1 => Counters::bump(&counters.samples_deleted),
            _ => {}
        }

        let volume = self.shared.volume.fixed();
        self.stuffer.apply_into(&frame.pcm, stuff, volume, &mut self.out);

        let frames = self.out.len() / CHANNELS;
        if let Err(e) = self.sink.play(&self.out, frames) {
            tracing::warn!(error = %e, seq = frame.sequence, "Sink rejected frame");
            Counters::bump(&counters.sink_errors);
        }
        Counters::bump(&counters.frames_played);
        self.played_since_sync = true;
    }
}
