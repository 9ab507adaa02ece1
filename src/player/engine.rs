//! Public playout engine
//!
//! One engine serves a sequence of play sessions. Between `start` and `stop`
//! a dedicated consumer thread renders audio while any number of producer
//! threads hand packets to `put_packet` or `handle_datagram`.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use super::buffer::{JitterBuffer, PutOutcome};
use super::clock::{Clock, MonotonicClock, ReferenceClock};
use super::config::{PlayoutConfig, RateCorrection, SessionConfig};
use super::drift::{DriftController, FixedRate, RateCorrector};
use super::playout::{
    Counters, PlayoutLoop, PlayoutState, ResendRequester, SessionState, Shared,
};
use crate::audio::decoder::FrameDecoder;
use crate::audio::sink::{AudioSink, SinkError};
use crate::error::PlayoutError;
use crate::protocol::rtp::{AudioPacket, PacketError, PayloadType};

/// Snapshot of engine counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayoutStats {
    /// Current phase, `None` when no session is running
    pub state: Option<PlayoutState>,
    /// Packets handed to the jitter buffer
    pub packets_received: u64,
    /// Late packets that still filled their slot
    pub packets_late: u64,
    /// Packets that arrived after their slot was played
    pub packets_too_late: u64,
    /// Duplicate packets
    pub packets_duplicate: u64,
    /// Packets dropped by a flush target
    pub packets_flushed: u64,
    /// Frames played as silence because their packet never arrived
    pub frames_missing: u64,
    /// Frames skipped to catch up with a late start
    pub frames_skipped: u64,
    /// Sequence numbers requested for retransmission
    pub resend_requests: u64,
    /// Payloads that failed to decrypt or decode
    pub decode_failures: u64,
    /// Output underruns
    pub underruns: u64,
    /// Forced resyncs from a lapped buffer
    pub overruns: u64,
    /// Frames sent to the sink
    pub frames_played: u64,
    /// Lead-in silence sent to the sink, in stereo samples
    pub silence_samples: u64,
    /// Sample pairs inserted by rate correction
    pub samples_inserted: u64,
    /// Sample pairs deleted by rate correction
    pub samples_deleted: u64,
    /// Failed sink writes
    pub sink_errors: u64,
    /// Frames currently buffered
    pub buffer_fill: usize,
    /// Latest playback rate estimate
    pub playback_rate: f64,
}

/// Real-time RTP playout engine
pub struct PlayoutEngine {
    config: PlayoutConfig,
    shared: Arc<Shared>,
    decoder: Mutex<Option<FrameDecoder>>,
    sink: Mutex<Option<Box<dyn AudioSink>>>,
    worker: Mutex<Option<JoinHandle<Box<dyn AudioSink>>>>,
}

impl PlayoutEngine {
    /// Create an engine rendering into `sink`
    #[must_use]
    pub fn new(config: PlayoutConfig, sink: Box<dyn AudioSink>) -> Self {
        Self::with_clock(config, sink, Arc::new(MonotonicClock::new()))
    }

    /// Create an engine on an explicit local time source
    #[must_use]
    pub fn with_clock(
        config: PlayoutConfig,
        sink: Box<dyn AudioSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Arc::new(Shared::new(clock, config.initial_volume_db));
        Self {
            config,
            shared,
            decoder: Mutex::new(None),
            sink: Mutex::new(Some(sink)),
            worker: Mutex::new(None),
        }
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &PlayoutConfig {
        &self.config
    }

    /// Install the channel used for retransmission requests
    pub fn set_resend_requester(&self, requester: Arc<dyn ResendRequester>) {
        *lock(&self.shared.resender) = Some(requester);
    }

    /// Current local time in 32.32 fixed-point seconds
    #[must_use]
    pub fn now(&self) -> u64 {
        self.shared.clock.now()
    }

    /// Begin a play session
    ///
    /// Resets all session state, opens the sink and spawns the playout
    /// thread. On failure nothing of the session remains.
    ///
    /// # Errors
    ///
    /// Returns `PlayoutError` if a session is already running, the
    /// configuration is invalid, or the decoder, sink or thread cannot be
    /// set up.
    pub fn start(&self, session: SessionConfig) -> Result<(), PlayoutError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Err(PlayoutError::AlreadyRunning);
        }

        self.config.validate()?;
        session.validate()?;

        let stream = &session.stream;
        let decoder = FrameDecoder::new(stream)?;
        let frame_samples = decoder.frame_samples();
        let latency = session.latency.unwrap_or(self.config.default_latency);

        let mut sink = lock(&self.sink)
            .take()
            .ok_or(PlayoutError::Sink(SinkError::Closed))?;
        if let Err(e) = sink.start(stream.sample_rate) {
            *lock(&self.sink) = Some(sink);
            return Err(e.into());
        }

        let hardware_volume = sink.has_hardware_volume();
        self.shared.volume.set_hardware(hardware_volume);

        let corrector: Box<dyn RateCorrector> = match self.config.rate_correction {
            RateCorrection::Stuffing => Box::new(DriftController::new(
                stream.frames_per_packet,
                stream.sample_rate,
            )),
            RateCorrection::Disabled => Box::new(FixedRate),
        };

        self.shared.counters.reset();
        *lock(&self.decoder) = Some(decoder);
        *self.shared.lock() = Some(SessionState {
            buffer: JitterBuffer::new(
                self.config.buffer_capacity,
                stream.frames_per_packet,
                frame_samples,
                self.config.start_fill,
                self.config.max_resend_span,
            ),
            reference: ReferenceClock::new(stream.sample_rate),
            phase: PlayoutState::Buffering,
            flush_pending: false,
            stop: false,
        });

        let playout = PlayoutLoop::new(
            Arc::clone(&self.shared),
            sink,
            corrector,
            stream.frames_per_packet,
            stream.sample_rate,
            latency,
        );

        let handle = std::thread::Builder::new()
            .name("raop-playout".into())
            .spawn(move || playout.run())
            .map_err(|e| {
                *self.shared.lock() = None;
                *lock(&self.decoder) = None;
                PlayoutError::ThreadSpawn(e)
            })?;
        *worker = Some(handle);

        tracing::info!(
            codec = ?stream.codec,
            sample_rate = stream.sample_rate,
            frames_per_packet = stream.frames_per_packet,
            encrypted = stream.is_encrypted(),
            latency,
            hardware_volume,
            "Playout session started"
        );
        Ok(())
    }

    /// Whether a session is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Decode a packet and insert it into the jitter buffer
    ///
    /// Returns `None` if no session is running. A payload that fails to
    /// decode is stored as silence.
    pub fn put_packet(
        &self,
        sequence: u16,
        rtp_timestamp: u32,
        payload: &[u8],
    ) -> Option<PutOutcome> {
        let pcm = {
            let mut decoder = lock(&self.decoder);
            let decoder = decoder.as_mut()?;
            match decoder.decode(payload) {
                Ok(pcm) => pcm,
                Err(e) => {
                    tracing::warn!(
                        seq = sequence,
                        error = %e,
                        "Undecodable packet, substituting silence"
                    );
                    Counters::bump(&self.shared.counters.decode_failures);
                    vec![0; decoder.frame_samples()]
                }
            }
        };

        let (outcome, resends) = {
            let mut guard = self.shared.lock();
            let session = guard.as_mut()?;
            let outcome = session.buffer.put(sequence, rtp_timestamp, &pcm);
            (outcome, session.buffer.take_resend_requests())
        };
        self.shared.ready.notify_one();
        self.shared.send_resends(resends);
        Some(outcome)
    }

    /// Parse an audio-port datagram or a retransmit response and insert it
    ///
    /// # Errors
    ///
    /// Returns `PacketError` if the datagram is not an audio packet.
    pub fn handle_datagram(&self, datagram: &[u8]) -> Result<Option<PutOutcome>, PacketError> {
        let packet = match datagram.get(1).copied().and_then(PayloadType::from_byte) {
            Some(PayloadType::RetransmitResponse) => AudioPacket::parse_resent(datagram)?,
            _ => AudioPacket::parse(datagram)?,
        };
        Ok(self.put_packet(packet.sequence, packet.timestamp, packet.payload))
    }

    /// Tie `rtp_timestamp` to a local time (32.32 fixed-point seconds)
    pub fn set_anchor(&self, rtp_timestamp: u32, local_time: u64) {
        {
            let mut guard = self.shared.lock();
            let Some(session) = guard.as_mut() else {
                return;
            };
            session.reference.set_anchor(rtp_timestamp, local_time);
        }
        tracing::debug!(rtp_timestamp, local_time, "Reference anchor updated");
        self.shared.ready.notify_one();
    }

    /// Current anchor as `(rtp_timestamp, local_time)`
    #[must_use]
    pub fn anchor(&self) -> Option<(u32, u64)> {
        let guard = self.shared.lock();
        let anchor = guard.as_ref()?.reference.anchor()?;
        Some((anchor.rtp_timestamp, anchor.local_time))
    }

    /// Drop buffered audio and return to buffering
    ///
    /// With a target timestamp, packets stamped before it are discarded
    /// until one at or after it arrives. The anchor is cleared; the sink is
    /// flushed by the playout thread.
    pub fn flush(&self, until: Option<u32>) {
        {
            let mut guard = self.shared.lock();
            let Some(session) = guard.as_mut() else {
                return;
            };
            session.buffer.flush(until);
            session.reference.clear();
            session.phase = PlayoutState::Buffering;
            session.flush_pending = true;
        }
        tracing::debug!(until, "Playout flushed");
        self.shared.ready.notify_all();
    }

    /// End the session and join the playout thread
    ///
    /// # Errors
    ///
    /// Returns `PlayoutError::NotRunning` if no session is active.
    pub fn stop(&self) -> Result<(), PlayoutError> {
        let handle = lock(&self.worker).take().ok_or(PlayoutError::NotRunning)?;

        if let Some(session) = self.shared.lock().as_mut() {
            session.stop = true;
        }
        self.shared.ready.notify_all();

        match handle.join() {
            Ok(sink) => *lock(&self.sink) = Some(sink),
            Err(_) => tracing::error!("Playout thread panicked; sink lost"),
        }

        *self.shared.lock() = None;
        *lock(&self.decoder) = None;
        tracing::info!("Playout session stopped");
        Ok(())
    }

    /// Apply a sender volume in dB (-30..0, or -144 for mute)
    pub fn set_volume(&self, db: f64) {
        self.shared.volume.set_db(db);
    }

    /// Software gain currently applied (1.0 with a hardware mixer)
    #[must_use]
    pub fn volume_linear(&self) -> f64 {
        self.shared.volume.linear()
    }

    /// Current phase, `None` when no session is running
    #[must_use]
    pub fn state(&self) -> Option<PlayoutState> {
        self.shared.lock().as_ref().map(|s| s.phase)
    }

    /// Snapshot of all counters
    #[must_use]
    pub fn stats(&self) -> PlayoutStats {
        let counters = &self.shared.counters;
        let load = |c: &std::sync::atomic::AtomicU64| c.load(Ordering::Relaxed);

        let mut stats = PlayoutStats {
            decode_failures: load(&counters.decode_failures),
            underruns: load(&counters.underruns),
            frames_played: load(&counters.frames_played),
            silence_samples: load(&counters.silence_samples),
            samples_inserted: load(&counters.samples_inserted),
            samples_deleted: load(&counters.samples_deleted),
            sink_errors: load(&counters.sink_errors),
            playback_rate: counters.playback_rate(),
            ..PlayoutStats::default()
        };

        if let Some(session) = self.shared.lock().as_ref() {
            let buffer = session.buffer.stats();
            stats.state = Some(session.phase);
            stats.packets_received = buffer.packets_received;
            stats.packets_late = buffer.packets_late;
            stats.packets_too_late = buffer.packets_too_late;
            stats.packets_duplicate = buffer.packets_duplicate;
            stats.packets_flushed = buffer.packets_flushed;
            stats.frames_missing = buffer.frames_missing;
            stats.frames_skipped = buffer.frames_skipped;
            stats.resend_requests = buffer.resend_requests;
            stats.overruns = buffer.overruns;
            stats.buffer_fill = session.buffer.fill();
        }
        stats
    }
}

impl Drop for PlayoutEngine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for PlayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayoutEngine")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
